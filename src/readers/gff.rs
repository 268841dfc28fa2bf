//! GFF3/GTF record reader.
//!
//! Both dialects share the nine-column layout and differ only in the
//! attribute syntax (`ID=x` vs `gene_id "x"`); the attribute parser accepts
//! either form, so one reader covers both formats.

use std::collections::HashMap;
use std::io::BufRead;

use crate::types::{GenePayload, Strand};
use crate::{Error, Result};

use super::{next_data_line, SourcePayload, SourceRecord};

const MISSING: &str = ".";

pub struct GffRecords {
    reader: Box<dyn BufRead + Send>,
    line: String,
    done: bool,
}

impl GffRecords {
    pub fn new(reader: Box<dyn BufRead + Send>) -> Self {
        GffRecords {
            reader,
            line: String::new(),
            done: false,
        }
    }

    fn parse_line(&self) -> Result<SourceRecord> {
        let line = self.line.trim_end();
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 8 {
            return Err(Error::MalformedRecord(format!(
                "expected at least 8 GFF columns, got {}: {line}",
                cols.len()
            )));
        }

        let start: u64 = cols[3]
            .parse()
            .map_err(|_| Error::MalformedRecord(format!("bad start in GFF line: {line}")))?;
        let end: u64 = cols[4]
            .parse()
            .map_err(|_| Error::MalformedRecord(format!("bad end in GFF line: {line}")))?;

        let attributes = cols
            .get(8)
            .map(|a| parse_attributes(a))
            .unwrap_or_default();

        let feature_id = attributes
            .get("ID")
            .or_else(|| attributes.get("gene_id"))
            .or_else(|| attributes.get("transcript_id"))
            .cloned();
        let feature_name = attributes
            .get("Name")
            .or_else(|| attributes.get("gene_name"))
            .cloned()
            .or_else(|| feature_id.clone());

        let payload = GenePayload {
            source: (cols[1] != MISSING).then(|| cols[1].to_string()),
            score: cols[5].parse::<f64>().ok(),
            strand: cols[6].parse::<Strand>().ok(),
            frame: cols[7].parse::<u8>().ok(),
            attributes,
            stream: None,
        };

        Ok(SourceRecord {
            contig: cols[0].to_string(),
            start,
            end: end.max(start),
            feature_id,
            feature_name,
            payload: SourcePayload::Gene {
                raw_type: cols[2].to_string(),
                payload,
            },
        })
    }
}

impl Iterator for GffRecords {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match next_data_line(self.reader.as_mut(), &mut self.line) {
            Ok(Some(())) => Some(self.parse_line()),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Parses column 9 in either GFF3 (`k=v;`) or GTF (`k "v";`) form
fn parse_attributes(col: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for piece in col.split(';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (key, value) = match piece.split_once('=') {
            Some((k, v)) => (k, v),
            None => match piece.split_once(' ') {
                Some((k, v)) => (k, v),
                None => continue,
            },
        };
        let value = value.trim().trim_matches('"');
        if !value.is_empty() {
            attributes.insert(key.trim().to_string(), value.to_string());
        }
    }
    attributes
}

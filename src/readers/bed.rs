//! BED record reader.
//!
//! BED intervals are 0-based half-open on disk; records are converted to
//! the engine's 1-based inclusive convention at parse time.

use std::io::BufRead;

use crate::{Error, Result};

use super::{next_data_line, SourcePayload, SourceRecord};

pub struct BedRecords {
    reader: Box<dyn BufRead + Send>,
    line: String,
    done: bool,
}

impl BedRecords {
    pub fn new(reader: Box<dyn BufRead + Send>) -> Self {
        BedRecords {
            reader,
            line: String::new(),
            done: false,
        }
    }

    fn parse_line(&self) -> Result<SourceRecord> {
        let line = self.line.trim_end();
        if line.starts_with("track") || line.starts_with("browser") {
            return Err(Error::MalformedRecord(format!(
                "unexpected BED directive: {line}"
            )));
        }

        let mut cols = line.split('\t');
        let contig = cols
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::MalformedRecord(format!("empty BED line: {line}")))?;
        let start: u64 = cols
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| Error::MalformedRecord(format!("bad start in BED line: {line}")))?;
        let end: u64 = cols
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| Error::MalformedRecord(format!("bad end in BED line: {line}")))?;
        let name = cols.next().filter(|n| !n.is_empty() && *n != ".");

        Ok(SourceRecord {
            contig: contig.to_string(),
            start: start + 1,
            end: end.max(start + 1),
            feature_id: name.map(str::to_string),
            feature_name: name.map(str::to_string),
            payload: SourcePayload::Interval,
        })
    }
}

impl Iterator for BedRecords {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match next_data_line(self.reader.as_mut(), &mut self.line) {
                Ok(Some(())) => {
                    // track/browser directives are legal, just not records
                    let trimmed = self.line.trim_end();
                    if trimmed.starts_with("track") || trimmed.starts_with("browser") {
                        continue;
                    }
                    return Some(self.parse_line());
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

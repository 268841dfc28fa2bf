//! VCF record reader.
//!
//! The meta/header block is parsed with noodles to validate the file; data
//! lines are split by column, which keeps the reader forward-only and
//! allocation-light for files with millions of rows.

use std::collections::HashMap;
use std::io::BufRead;

use noodles::vcf::Header;

use crate::types::{VariantPayload, VariationType};
use crate::{Error, Result};

use super::{next_data_line, SourcePayload, SourceRecord};

const MISSING: &str = ".";
const PASS: &str = "PASS";

pub struct VcfRecords {
    reader: Box<dyn BufRead + Send>,
    line: String,
    done: bool,
}

impl VcfRecords {
    /// Consumes the header block and validates it as VCF
    pub fn new(mut reader: Box<dyn BufRead + Send>) -> Result<Self> {
        let mut header_text = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if line.starts_with('#') {
                header_text.push_str(&line);
                if line.starts_with("#CHROM") {
                    break;
                }
            } else {
                return Err(Error::MalformedRecord(
                    "VCF data line before #CHROM header".to_string(),
                ));
            }
        }

        let _header: Header = header_text
            .parse()
            .map_err(|e| Error::MalformedRecord(format!("invalid VCF header: {e}")))?;

        Ok(VcfRecords {
            reader,
            line: String::new(),
            done: false,
        })
    }

    fn parse_line(&self) -> Result<SourceRecord> {
        let line = self.line.trim_end();
        let mut cols = line.split('\t');
        let contig = cols
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::MalformedRecord(format!("empty VCF line: {line}")))?;
        let pos: u64 = cols
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::MalformedRecord(format!("bad POS in VCF line: {line}")))?;
        let id = cols.next().unwrap_or(MISSING);
        let reference = cols.next().unwrap_or("");
        let alternate = cols.next().unwrap_or(MISSING);
        let quality = cols.next().and_then(|q| q.parse::<f64>().ok());
        let filter = cols.next().unwrap_or(MISSING);
        let info_col = cols.next().unwrap_or(MISSING);

        let info = parse_info(info_col);
        let end = info
            .get("END")
            .and_then(|e| e.parse::<u64>().ok())
            .unwrap_or_else(|| pos + reference.len().max(1) as u64 - 1);

        let failed_filters = match filter {
            MISSING | PASS | "" => Vec::new(),
            other => other.split(';').map(str::to_string).collect(),
        };

        // Gene associations, when the annotation pipeline wrote them
        let gene_ids = split_info_list(&info, "GENE");
        let gene_names = split_info_list(&info, "GENE_NAME");

        let payload = VariantPayload {
            variation_type: classify(reference, alternate),
            quality,
            gene_ids,
            gene_names,
            failed_filters,
            info,
        };

        let feature_id = (id != MISSING && !id.is_empty()).then(|| id.to_string());

        Ok(SourceRecord {
            contig: contig.to_string(),
            start: pos,
            end: end.max(pos),
            feature_name: feature_id.clone(),
            feature_id,
            payload: SourcePayload::Variant(payload),
        })
    }
}

impl Iterator for VcfRecords {
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

fn parse_info(col: &str) -> HashMap<String, String> {
    if col == MISSING {
        return HashMap::new();
    }
    col.split(';')
        .filter(|kv| !kv.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (kv.to_string(), "true".to_string()),
        })
        .collect()
}

fn split_info_list(info: &HashMap<String, String>, key: &str) -> Vec<String> {
    info.get(key)
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

fn classify_single(reference: &str, alternate: &str) -> VariationType {
    if alternate.contains('[') || alternate.contains(']') {
        return VariationType::Bnd;
    }
    match alternate {
        "<DEL>" => return VariationType::Del,
        "<INS>" => return VariationType::Ins,
        "<DUP>" | "<DUP:TANDEM>" => return VariationType::Dup,
        "<INV>" => return VariationType::Inv,
        _ => {}
    }
    match (reference.len(), alternate.len()) {
        (1, 1) => VariationType::Snv,
        (r, a) if r == a => VariationType::Mnp,
        (r, a) if r < a => VariationType::Ins,
        _ => VariationType::Del,
    }
}

fn classify(reference: &str, alternate: &str) -> Option<VariationType> {
    if alternate == MISSING || alternate.is_empty() {
        return None;
    }
    let mut types = alternate.split(',').map(|alt| classify_single(reference, alt));
    let first = types.next()?;
    if types.all(|t| t == first) {
        Some(first)
    } else {
        Some(VariationType::Mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
##fileformat=VCFv4.2
##contig=<ID=1,length=1000>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
1\t100\trs1\tA\tG\t50\tPASS\tDP=10
1\t200\t.\tAT\tA\t.\tq10\tDP=3;GENE=ENSG1,ENSG2
MT\t10\trs9\tC\t<DUP>\t20\tPASS\tEND=500
";

    fn records() -> Vec<SourceRecord> {
        let reader: Box<dyn BufRead + Send> = Box::new(SAMPLE.as_bytes());
        VcfRecords::new(reader)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_parses_data_lines() {
        let recs = records();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].contig, "1");
        assert_eq!(recs[0].start, 100);
        assert_eq!(recs[0].end, 100);
        assert_eq!(recs[0].feature_id.as_deref(), Some("rs1"));
    }

    #[test]
    fn test_variation_types_and_filters() {
        let recs = records();
        let SourcePayload::Variant(v0) = &recs[0].payload else {
            panic!("expected variant")
        };
        assert_eq!(v0.variation_type, Some(VariationType::Snv));
        assert_eq!(v0.quality, Some(50.0));
        assert!(v0.failed_filters.is_empty());

        let SourcePayload::Variant(v1) = &recs[1].payload else {
            panic!("expected variant")
        };
        assert_eq!(v1.variation_type, Some(VariationType::Del));
        assert_eq!(v1.failed_filters, vec!["q10".to_string()]);
        assert_eq!(v1.gene_ids, vec!["ENSG1".to_string(), "ENSG2".to_string()]);
        assert!(recs[1].feature_id.is_none());
    }

    #[test]
    fn test_symbolic_end() {
        let recs = records();
        assert_eq!(recs[2].start, 10);
        assert_eq!(recs[2].end, 500);
        let SourcePayload::Variant(v) = &recs[2].payload else {
            panic!("expected variant")
        };
        assert_eq!(v.variation_type, Some(VariationType::Dup));
    }

    #[test]
    fn test_rejects_headerless_data() {
        let text = "1\t100\trs1\tA\tG\t50\tPASS\tDP=10\n";
        let reader: Box<dyn BufRead + Send> = Box::new(text.as_bytes());
        assert!(VcfRecords::new(reader).is_err());
    }
}

//! Forward-only feature-file readers.
//!
//! Readers are deliberately thin: they turn one text line into one
//! [`SourceRecord`] and leave chromosome resolution, eligibility filtering
//! and document conversion to the index builder. Files may be plain text,
//! gzip or bgzf; compression is detected from the magic bytes.

mod bed;
mod gff;
mod vcf;

pub use bed::BedRecords;
pub use gff::GffRecords;
pub use vcf::VcfRecords;

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;
use noodles::bgzf;

use crate::types::{FeatureFile, FileFormat, GenePayload, VariantPayload};
use crate::Result;

/// One record from a feature file, before chromosome resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub contig: String,
    /// 1-based, inclusive
    pub start: u64,
    /// 1-based, inclusive, `start <= end`
    pub end: u64,
    pub feature_id: Option<String>,
    pub feature_name: Option<String>,
    pub payload: SourcePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Variant(VariantPayload),
    Gene {
        /// Raw type column ("gene", "mRNA", "exon", "CDS", ...)
        raw_type: String,
        payload: GenePayload,
    },
    Interval,
}

/// A finite, non-restartable stream of source records
pub type RecordStream = Box<dyn Iterator<Item = Result<SourceRecord>> + Send>;

/// Opens the reader matching the file's registered format
pub fn open_reader(file: &FeatureFile) -> Result<RecordStream> {
    let text = open_text(&file.path)?;
    Ok(match file.format {
        FileFormat::Vcf => Box::new(VcfRecords::new(text)?),
        FileFormat::Gff | FileFormat::Gtf => Box::new(GffRecords::new(text)),
        FileFormat::Bed => Box::new(BedRecords::new(text)),
    })
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn is_bgzf(header: &[u8]) -> bool {
    // gzip magic + FEXTRA flag + BC subfield tag
    header.len() >= 14
        && header[..2] == GZIP_MAGIC
        && header[3] & 0x04 != 0
        && header[12] == b'B'
        && header[13] == b'C'
}

/// Opens a file as a line reader, transparently decoding bgzf or gzip
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path)?;

    let mut magic = [0u8; 14];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn BufRead + Send> = if n >= 14 && is_bgzf(&magic) {
        Box::new(BufReader::new(bgzf::Reader::new(file)))
    } else if n >= 2 && magic[..2] == GZIP_MAGIC {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

/// Reads the next non-empty, non-comment line; `None` at end of stream
pub(crate) fn next_data_line(
    reader: &mut (dyn BufRead + Send),
    buf: &mut String,
) -> std::io::Result<Option<()>> {
    loop {
        buf.clear();
        if reader.read_line(buf)? == 0 {
            return Ok(None);
        }
        let line = buf.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        return Ok(Some(()));
    }
}

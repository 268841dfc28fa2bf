use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub type FileId = i64;
pub type ChromosomeId = i64;

/// A chromosome of a reference genome. Coordinates are 1-based, inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromosome {
    pub id: ChromosomeId,
    pub name: String,
    pub size: u64,
    pub reference_id: i64,
}

/// Feature file formats this engine indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Vcf,
    Gff,
    Gtf,
    Bed,
}

impl FileFormat {
    pub fn is_variants(&self) -> bool {
        matches!(self, FileFormat::Vcf)
    }

    pub fn is_gene(&self) -> bool {
        matches!(self, FileFormat::Gff | FileFormat::Gtf)
    }
}

/// A registered feature file, the owning unit of every indexed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFile {
    pub id: FileId,
    pub name: String,
    pub format: FileFormat,
    pub path: PathBuf,
    pub reference_id: i64,
}

/// Kind tag of an indexed feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureType {
    Variation,
    Gene,
    Mrna,
    Exon,
    BedFeature,
    Bookmark,
}

impl FeatureType {
    /// Raw term value under which the type is indexed
    pub fn as_index_value(&self) -> &'static str {
        match self {
            FeatureType::Variation => "variation",
            FeatureType::Gene => "gene",
            FeatureType::Mrna => "mrna",
            FeatureType::Exon => "exon",
            FeatureType::BedFeature => "bed_feature",
            FeatureType::Bookmark => "bookmark",
        }
    }

    pub fn from_index_value(value: &str) -> Option<FeatureType> {
        match value {
            "variation" => Some(FeatureType::Variation),
            "gene" => Some(FeatureType::Gene),
            "mrna" => Some(FeatureType::Mrna),
            "exon" => Some(FeatureType::Exon),
            "bed_feature" => Some(FeatureType::BedFeature),
            "bookmark" => Some(FeatureType::Bookmark),
            _ => None,
        }
    }
}

/// Maps a GFF/GTF type column to the feature types this engine indexes.
/// Types outside this set (CDS, UTRs, ...) are not indexed.
pub fn gene_feature_type(raw: &str) -> Option<FeatureType> {
    match raw.to_ascii_lowercase().as_str() {
        "gene" => Some(FeatureType::Gene),
        "mrna" | "transcript" => Some(FeatureType::Mrna),
        "exon" => Some(FeatureType::Exon),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariationType {
    Snv,
    Mnp,
    Ins,
    Del,
    Dup,
    Inv,
    Bnd,
    Mixed,
}

impl VariationType {
    pub fn as_index_value(&self) -> &'static str {
        match self {
            VariationType::Snv => "snv",
            VariationType::Mnp => "mnp",
            VariationType::Ins => "ins",
            VariationType::Del => "del",
            VariationType::Dup => "dup",
            VariationType::Inv => "inv",
            VariationType::Bnd => "bnd",
            VariationType::Mixed => "mixed",
        }
    }

    pub fn from_index_value(value: &str) -> Option<VariationType> {
        match value {
            "snv" => Some(VariationType::Snv),
            "mnp" => Some(VariationType::Mnp),
            "ins" => Some(VariationType::Ins),
            "del" => Some(VariationType::Del),
            "dup" => Some(VariationType::Dup),
            "inv" => Some(VariationType::Inv),
            "bnd" => Some(VariationType::Bnd),
            "mixed" => Some(VariationType::Mixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl Strand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
        }
    }
}

impl std::str::FromStr for Strand {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            other => Err(crate::Error::MalformedRecord(format!(
                "invalid strand: {other}"
            ))),
        }
    }
}

/// Which of the two gene streams a record came from in dual-reader builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneStreamKind {
    LargeScale,
    Transcript,
}

impl GeneStreamKind {
    pub fn as_index_value(&self) -> &'static str {
        match self {
            GeneStreamKind::LargeScale => "large_scale",
            GeneStreamKind::Transcript => "transcript",
        }
    }
}

/// Selects whether transcript/exon records are indexed alongside genes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneContentMode {
    Full,
    Incremental,
}

/// Kind-specific payload of a feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Variant(VariantPayload),
    Gene(GenePayload),
    Interval,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantPayload {
    pub variation_type: Option<VariationType>,
    pub quality: Option<f64>,
    pub gene_ids: Vec<String>,
    pub gene_names: Vec<String>,
    pub failed_filters: Vec<String>,
    pub info: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenePayload {
    pub source: Option<String>,
    pub score: Option<f64>,
    pub strand: Option<Strand>,
    pub frame: Option<u8>,
    pub attributes: HashMap<String, String>,
    pub stream: Option<GeneStreamKind>,
}

/// One indexed genomic feature. Owned by exactly one file and one
/// chromosome of that file's reference genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub uid: Uuid,
    pub file_id: FileId,
    pub chromosome_id: ChromosomeId,
    pub chromosome_name: String,
    pub start_index: u64,
    pub end_index: u64,
    pub feature_id: Option<String>,
    pub feature_name: Option<String>,
    pub feature_type: FeatureType,
    pub kind: FeatureKind,
}

/// One bucket of a Wig-like downsampled track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub start_index: u64,
    pub end_index: u64,
    pub value: f32,
}

/// Result of one search, immutable once returned
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub entries: Vec<FeatureRecord>,
    /// Exact match count, independent of page size
    pub total_results_count: usize,
    /// Only present for paginated searches
    pub total_pages_count: Option<usize>,
    /// True when an unpaginated search was truncated by the internal cap
    pub exceeds_limit: bool,
}

impl SearchResult {
    pub fn empty() -> Self {
        SearchResult::default()
    }

    /// Appends `other`'s entries after this result's own, producing the
    /// merged result. Neither input order is disturbed; counts are summed.
    pub fn merge_from(mut self, other: SearchResult) -> SearchResult {
        self.entries.extend(other.entries);
        self.total_results_count += other.total_results_count;
        self.exceeds_limit = self.exceeds_limit || other.exceeds_limit;
        self
    }
}

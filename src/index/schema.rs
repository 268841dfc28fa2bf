//! Field layout for feature documents.
//!
//! Search-relevant attributes are indexed as individual fields; the full
//! kind-specific payload is additionally stored as one JSON blob so a hit
//! reconstructs losslessly without a stored copy of every field.

use tantivy::schema::{
    Field, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::TantivyDocument;
use uuid::Uuid;

use crate::types::{FeatureKind, FeatureRecord, FeatureType};
use crate::{Error, Result};

pub const UID: &str = "uid";
pub const FILE_ID: &str = "file_id";
pub const CHROMOSOME_ID: &str = "chromosome_id";
pub const CHROMOSOME_NAME: &str = "chromosome_name";
pub const START_INDEX: &str = "start_index";
pub const END_INDEX: &str = "end_index";
pub const FEATURE_TYPE: &str = "feature_type";
pub const FEATURE_ID: &str = "feature_id";
pub const FEATURE_NAME: &str = "feature_name";
pub const VARIATION_TYPE: &str = "variation_type";
pub const QUALITY: &str = "quality";
pub const GENE_IDS: &str = "gene_ids";
pub const GENE_NAMES: &str = "gene_names";
pub const FAILED_FILTER: &str = "failed_filter";
pub const STREAM: &str = "stream";
pub const SORT_KEY: &str = "sort_key";
pub const PAYLOAD: &str = "payload";

/// Schema plus resolved field handles. Identical for every index this
/// engine writes, which lets one compiled query run against many indexes.
#[derive(Clone)]
pub struct FeatureSchema {
    pub schema: Schema,
    pub uid: Field,
    pub file_id: Field,
    pub chromosome_id: Field,
    pub chromosome_name: Field,
    pub start_index: Field,
    pub end_index: Field,
    pub feature_type: Field,
    pub feature_id: Field,
    pub feature_name: Field,
    pub variation_type: Field,
    pub quality: Field,
    pub gene_ids: Field,
    pub gene_names: Field,
    pub failed_filter: Field,
    pub stream: Field,
    pub sort_key: Field,
    pub payload: Field,
}

impl FeatureSchema {
    pub fn new() -> Self {
        let mut builder = Schema::builder();
        let uid = builder.add_text_field(UID, STRING | STORED);
        let file_id = builder.add_i64_field(FILE_ID, INDEXED | STORED | FAST);
        let chromosome_id = builder.add_i64_field(CHROMOSOME_ID, INDEXED | STORED | FAST);
        let chromosome_name = builder.add_text_field(CHROMOSOME_NAME, STRING | STORED | FAST);
        let start_index = builder.add_u64_field(START_INDEX, INDEXED | STORED | FAST);
        let end_index = builder.add_u64_field(END_INDEX, INDEXED | STORED | FAST);
        let feature_type = builder.add_text_field(FEATURE_TYPE, STRING | STORED | FAST);
        let feature_id = builder.add_text_field(FEATURE_ID, TEXT | STORED);
        let feature_name = builder.add_text_field(FEATURE_NAME, TEXT | STORED);
        let variation_type = builder.add_text_field(VARIATION_TYPE, STRING | FAST);
        let quality = builder.add_f64_field(QUALITY, FAST);
        let gene_ids = builder.add_text_field(GENE_IDS, TEXT);
        let gene_names = builder.add_text_field(GENE_NAMES, TEXT);
        let failed_filter = builder.add_text_field(FAILED_FILTER, STRING | FAST);
        let stream = builder.add_text_field(STREAM, STRING | FAST);
        let sort_key = builder.add_u64_field(SORT_KEY, FAST);
        let payload = builder.add_text_field(PAYLOAD, STORED);

        FeatureSchema {
            schema: builder.build(),
            uid,
            file_id,
            chromosome_id,
            chromosome_name,
            start_index,
            end_index,
            feature_type,
            feature_id,
            feature_name,
            variation_type,
            quality,
            gene_ids,
            gene_names,
            failed_filter,
            stream,
            sort_key,
            payload,
        }
    }

    /// Default-sort key: a stable total order over
    /// (chromosome, start, uid-low-bits) packed into one fast field
    pub fn sort_key_for(record: &FeatureRecord) -> u64 {
        let chromosome = (record.chromosome_id as u64) & 0xFFFF;
        let start = record.start_index & 0xFFFF_FFFF;
        let uid_low = (record.uid.as_u128() as u64) & 0xFFFF;
        (chromosome << 48) | (start << 16) | uid_low
    }

    pub fn make_document(&self, record: &FeatureRecord) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.uid, record.uid.to_string());
        doc.add_i64(self.file_id, record.file_id);
        doc.add_i64(self.chromosome_id, record.chromosome_id);
        doc.add_text(self.chromosome_name, &record.chromosome_name);
        doc.add_u64(self.start_index, record.start_index);
        doc.add_u64(self.end_index, record.end_index);
        doc.add_text(self.feature_type, record.feature_type.as_index_value());
        if let Some(id) = &record.feature_id {
            doc.add_text(self.feature_id, id);
        }
        if let Some(name) = &record.feature_name {
            doc.add_text(self.feature_name, name);
        }
        doc.add_u64(self.sort_key, Self::sort_key_for(record));

        match &record.kind {
            FeatureKind::Variant(v) => {
                if let Some(vt) = v.variation_type {
                    doc.add_text(self.variation_type, vt.as_index_value());
                }
                doc.add_f64(self.quality, v.quality.unwrap_or(0.0));
                for gene in &v.gene_ids {
                    doc.add_text(self.gene_ids, gene);
                }
                for gene in &v.gene_names {
                    doc.add_text(self.gene_names, gene);
                }
                for filter in &v.failed_filters {
                    doc.add_text(self.failed_filter, filter);
                }
            }
            FeatureKind::Gene(g) => {
                doc.add_f64(self.quality, g.score.unwrap_or(0.0));
                if let Some(stream) = g.stream {
                    doc.add_text(self.stream, stream.as_index_value());
                }
            }
            FeatureKind::Interval => {
                doc.add_f64(self.quality, 0.0);
            }
        }

        doc.add_text(self.payload, serde_json::to_string(&record.kind)?);
        Ok(doc)
    }

    /// Reconstructs a record from a stored document. `info_fields`, when
    /// present, projects a variant's info map down to the named keys.
    pub fn read_record(
        &self,
        doc: &TantivyDocument,
        info_fields: Option<&[String]>,
    ) -> Result<FeatureRecord> {
        let text = |field: Field| -> Option<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let uid = text(self.uid)
            .and_then(|u| Uuid::parse_str(&u).ok())
            .ok_or_else(|| Error::Internal("document missing uid".to_string()))?;
        let feature_type = text(self.feature_type)
            .and_then(|t| FeatureType::from_index_value(&t))
            .ok_or_else(|| Error::Internal("document missing feature type".to_string()))?;

        let mut kind: FeatureKind = match text(self.payload) {
            Some(json) => serde_json::from_str(&json)?,
            None => FeatureKind::Interval,
        };
        if let (FeatureKind::Variant(v), Some(fields)) = (&mut kind, info_fields) {
            v.info.retain(|k, _| fields.iter().any(|f| f == k));
        }

        Ok(FeatureRecord {
            uid,
            file_id: doc
                .get_first(self.file_id)
                .and_then(|v| v.as_i64())
                .unwrap_or_default(),
            chromosome_id: doc
                .get_first(self.chromosome_id)
                .and_then(|v| v.as_i64())
                .unwrap_or_default(),
            chromosome_name: text(self.chromosome_name).unwrap_or_default(),
            start_index: doc
                .get_first(self.start_index)
                .and_then(|v| v.as_u64())
                .unwrap_or_default(),
            end_index: doc
                .get_first(self.end_index)
                .and_then(|v| v.as_u64())
                .unwrap_or_default(),
            feature_id: text(self.feature_id),
            feature_name: text(self.feature_name),
            feature_type,
            kind,
        })
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        FeatureSchema::new()
    }
}

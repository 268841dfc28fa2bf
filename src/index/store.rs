//! Wrapper over the embedded search engine.
//!
//! One tantivy index per feature file, all sharing [`FeatureSchema`], so a
//! query compiled once runs against any number of per-file indexes and the
//! merged hits keep one global sort order.
//!
//! Writer discipline: at most one active writer per file index. Flushes
//! become visible to readers only at [`IndexWriterHandle::close`], which
//! commits.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::Query;
use tantivy::{Index, Order, TantivyDocument, Term};

use super::filter::{SortBy, SortSpec};
use super::schema::FeatureSchema;
use crate::types::{FeatureRecord, FileId};
use crate::{Error, Result};

/// Writer heap per index build; tantivy flushes segments beyond this.
pub const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Upper bound on distinct values returned by an aggregation
const FACET_LIMIT: usize = 1000;

/// Marker file written next to the index once a writer has committed.
/// tantivy creates `meta.json` the moment a writer opens, so readiness
/// must be keyed on this marker, not on the index metadata.
pub const READY_MARKER: &str = "featix.ready";

/// Destination of index-builder batches. The production sink is a tantivy
/// writer; tests substitute a recording sink to observe batch boundaries.
pub trait FeatureSink {
    fn write_batch(&mut self, batch: Vec<FeatureRecord>) -> Result<()>;

    /// Commits everything written so far and releases the writer
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

pub struct IndexWriterHandle {
    schema: FeatureSchema,
    writer: tantivy::IndexWriter,
    dir: PathBuf,
}

impl IndexWriterHandle {
    /// Opens (or creates) the index under `dir` for appending
    pub fn create_or_open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let directory = MmapDirectory::open(dir).map_err(|e| {
            let e: tantivy::TantivyError = e.into();
            Error::Index(e)
        })?;
        let schema = FeatureSchema::new();
        let index = Index::open_or_create(directory, schema.schema.clone())?;
        let writer: tantivy::IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        Ok(IndexWriterHandle {
            schema,
            writer,
            dir: dir.to_path_buf(),
        })
    }
}

impl FeatureSink for IndexWriterHandle {
    fn write_batch(&mut self, batch: Vec<FeatureRecord>) -> Result<()> {
        for record in batch {
            self.writer.add_document(self.schema.make_document(&record)?)?;
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        let mut writer = self.writer;
        writer.commit()?;
        // readers treat the index as built only once this lands
        fs::write(self.dir.join(READY_MARKER), [])?;
        Ok(())
    }
}

/// Removes every document owned by `file_id` from the index under `dir`.
/// Used when one file of a collection-level index is dropped.
pub fn delete_file_documents(dir: &Path, file_id: FileId) -> Result<()> {
    let schema = FeatureSchema::new();
    let index = Index::open_in_dir(dir)?;
    let mut writer: tantivy::IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
    writer.delete_term(Term::from_field_i64(schema.file_id, file_id));
    writer.commit()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortValue {
    U64(u64),
    F64(f64),
}

impl SortValue {
    fn cmp_asc(&self, other: &SortValue) -> std::cmp::Ordering {
        match (self, other) {
            (SortValue::U64(a), SortValue::U64(b)) => a.cmp(b),
            (SortValue::F64(a), SortValue::F64(b)) => a.total_cmp(b),
            // mixed values cannot occur: one sort spec per search
            _ => std::cmp::Ordering::Equal,
        }
    }
}

/// Read handle over the indexes of one or more feature files
pub struct IndexCollection {
    schema: FeatureSchema,
    indexes: Vec<Index>,
}

impl IndexCollection {
    pub fn open(dirs: &[PathBuf]) -> Result<Self> {
        let schema = FeatureSchema::new();
        let mut indexes = Vec::with_capacity(dirs.len());
        for dir in dirs {
            indexes.push(Index::open_in_dir(dir)?);
        }
        Ok(IndexCollection { schema, indexes })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Executes `query` over every index, merges hits under `sort`, and
    /// returns the `[offset, offset + limit)` slice plus the exact total.
    pub fn search(
        &self,
        query: &dyn Query,
        sort: &SortSpec,
        offset: usize,
        limit: usize,
        info_fields: Option<&[String]>,
    ) -> Result<(Vec<FeatureRecord>, usize)> {
        let fetch = (offset + limit).max(1);
        let order = if sort.descending { Order::Desc } else { Order::Asc };

        let mut total = 0usize;
        let mut hits: Vec<(SortValue, FeatureRecord)> = Vec::new();

        for index in &self.indexes {
            let searcher = index.reader()?.searcher();
            match sort.by {
                SortBy::Quality => {
                    let collector = TopDocs::with_limit(fetch)
                        .order_by_fast_field::<f64>(sort.by.fast_field(), order.clone());
                    let (count, docs) = searcher.search(query, &(Count, collector))?;
                    total += count;
                    for (key, address) in docs {
                        let doc: TantivyDocument = searcher.doc(address)?;
                        hits.push((
                            SortValue::F64(key),
                            self.schema.read_record(&doc, info_fields)?,
                        ));
                    }
                }
                _ => {
                    let collector = TopDocs::with_limit(fetch)
                        .order_by_fast_field::<u64>(sort.by.fast_field(), order.clone());
                    let (count, docs) = searcher.search(query, &(Count, collector))?;
                    total += count;
                    for (key, address) in docs {
                        let doc: TantivyDocument = searcher.doc(address)?;
                        hits.push((
                            SortValue::U64(key),
                            self.schema.read_record(&doc, info_fields)?,
                        ));
                    }
                }
            }
        }

        // stable sort keeps per-index order for equal keys
        if sort.descending {
            hits.sort_by(|a, b| b.0.cmp_asc(&a.0));
        } else {
            hits.sort_by(|a, b| a.0.cmp_asc(&b.0));
        }

        let records = hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, r)| r)
            .collect();
        Ok((records, total))
    }

    /// Exact match count without materializing documents
    pub fn count(&self, query: &dyn Query) -> Result<usize> {
        let mut total = 0;
        for index in &self.indexes {
            let searcher = index.reader()?.searcher();
            total += searcher.search(query, &Count)?;
        }
        Ok(total)
    }

    /// Matching-document count per distinct value of `field`, via the
    /// store's terms aggregation. Cost scales with distinct values, not
    /// with matches. Ordered by descending count, then by value.
    pub fn terms_count(&self, query: &dyn Query, field: &str) -> Result<Vec<(String, u64)>> {
        use tantivy::aggregation::agg_req::Aggregations;
        use tantivy::aggregation::AggregationCollector;

        let request: Aggregations = serde_json::from_value(serde_json::json!({
            "group": { "terms": { "field": field, "size": FACET_LIMIT } }
        }))?;

        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for index in &self.indexes {
            let searcher = index.reader()?.searcher();
            let collector = AggregationCollector::from_aggs(request.clone(), Default::default());
            let fruit = searcher.search(query, &collector)?;
            let value = serde_json::to_value(&fruit)?;
            let buckets = value
                .pointer("/group/buckets")
                .and_then(|b| b.as_array())
                .cloned()
                .unwrap_or_default();
            for bucket in buckets {
                let key = normalize_key(&bucket["key"]);
                let count = bucket["doc_count"].as_u64().unwrap_or(0);
                *merged.entry(key).or_insert(0) += count;
            }
        }

        let mut counts: Vec<(String, u64)> = merged.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    /// Distinct values of `field` across all documents
    pub fn distinct_values(&self, field: &str) -> Result<Vec<String>> {
        let all = tantivy::query::AllQuery;
        let mut values: Vec<String> = self
            .terms_count(&all, field)?
            .into_iter()
            .map(|(value, _)| value)
            .collect();
        values.sort();
        Ok(values)
    }
}

/// Aggregation keys come back as strings for text fields and numbers for
/// numeric fast fields; fold both into a string form.
fn normalize_key(key: &serde_json::Value) -> String {
    match key {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(u) => u.to_string(),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => (f as i64).to_string(),
                Some(f) => f.to_string(),
                None => n.to_string(),
            },
        },
        other => other.to_string(),
    }
}

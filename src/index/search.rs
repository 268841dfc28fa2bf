//! High-level search over feature indexes.
//!
//! [`SearchEngine`] ties the collaborators together: the [`FileStore`]
//! locates per-file indexes, filters are compiled into store queries, and
//! multi-file results are merged under one global sort order. Searching a
//! file whose index was never built is an error, not an empty result.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bookmarks::BookmarkSearcher;
use crate::reference::Reference;
use crate::store::FileStore;
use crate::types::{ChromosomeId, FeatureFile, FeatureType, FileId, SearchResult};
use crate::{Error, Result};

use super::filter::{self, FilterSpec, SortSpec, MIN_PREFIX_LEN};
use super::schema;
use super::store::IndexCollection;

pub struct SearchEngine {
    file_store: Arc<dyn FileStore>,
    /// Cap on entries returned by unpaginated searches
    max_search_results: usize,
}

impl SearchEngine {
    pub fn new(file_store: Arc<dyn FileStore>, max_search_results: usize) -> Self {
        SearchEngine {
            file_store,
            max_search_results: max_search_results.max(1),
        }
    }

    /// Searches `files` with a compiled filter.
    ///
    /// Paginated requests return the requested page plus the exact total
    /// and page count. Unpaginated requests return at most the configured
    /// cap and flag truncation via `exceeds_limit`.
    pub fn search(
        &self,
        files: &[FeatureFile],
        spec: &FilterSpec,
        target: FeatureType,
    ) -> Result<SearchResult> {
        spec.validate_paging()?;
        if files.is_empty() {
            return Ok(SearchResult::empty());
        }

        let collection = self.open_collection(files)?;
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
        let compiled = filter::compile(spec, target, collection.schema(), &file_ids)?;
        let info = spec.info_fields.as_deref();

        if let (Some(page), Some(page_size)) = (spec.page, spec.page_size) {
            let offset = (page - 1) * page_size;
            let (entries, total) =
                collection.search(&*compiled.query, &compiled.sort, offset, page_size, info)?;
            Ok(SearchResult {
                entries,
                total_results_count: total,
                total_pages_count: Some(total.div_ceil(page_size)),
                exceeds_limit: false,
            })
        } else {
            let (entries, total) = collection.search(
                &*compiled.query,
                &compiled.sort,
                0,
                self.max_search_results,
                info,
            )?;
            Ok(SearchResult {
                entries,
                total_results_count: total,
                total_pages_count: None,
                exceeds_limit: total > self.max_search_results,
            })
        }
    }

    /// Page count a paginated search over `files` would produce, without
    /// materializing any documents.
    pub fn total_pages(
        &self,
        files: &[FeatureFile],
        spec: &FilterSpec,
        target: FeatureType,
    ) -> Result<usize> {
        let page_size = spec.page_size.ok_or_else(|| {
            Error::InvalidFilter("page_size is required to compute page count".to_string())
        })?;
        if page_size == 0 {
            return Err(Error::InvalidFilter(
                "page and page_size must be positive".to_string(),
            ));
        }
        if files.is_empty() {
            return Ok(0);
        }

        // the count query carries the filter's predicates; its paging is
        // irrelevant, so normalize before compilation validates it
        let mut spec = spec.clone();
        spec.page.get_or_insert(1);

        let collection = self.open_collection(files)?;
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
        let compiled = filter::compile(&spec, target, collection.schema(), &file_ids)?;
        let total = collection.count(&*compiled.query)?;
        Ok(total.div_ceil(page_size))
    }

    /// Reference-wide feature lookup by id/name prefix.
    ///
    /// Bookmarks are searched first and their hits precede index hits in
    /// the merged result; the two are never de-duplicated. A prefix below
    /// the minimum length short-circuits to an empty result.
    pub fn search_features_by_reference(
        &self,
        prefix: &str,
        reference: &Reference,
        bookmarks: &dyn BookmarkSearcher,
    ) -> Result<SearchResult> {
        let prefix = prefix.trim();
        if prefix.len() < MIN_PREFIX_LEN {
            return Ok(SearchResult::empty());
        }

        let bookmark_hits = bookmarks.search_bookmarks(prefix, self.max_search_results)?;

        // annotation files registered before their index was built are
        // skipped, not an error
        let files: Vec<FeatureFile> = reference
            .gene_search_files()
            .into_iter()
            .filter(|f| {
                let exists = self.file_store.index_exists(f);
                if !exists {
                    tracing::debug!(file = f.id, "skipping gene file without index");
                }
                exists
            })
            .collect();
        if files.is_empty() {
            return Ok(bookmark_hits);
        }

        let collection = self.open_collection(&files)?;
        let query = filter::feature_prefix_query(collection.schema(), prefix)?;
        let (entries, total) =
            collection.search(&*query, &SortSpec::default(), 0, self.max_search_results, None)?;
        let features = SearchResult {
            entries,
            total_results_count: total,
            total_pages_count: None,
            exceeds_limit: total > self.max_search_results,
        };

        Ok(bookmark_hits.merge_from(features))
    }

    /// Features overlapping `[start, end]` on one chromosome: records that
    /// start inside, end inside, or span the interval.
    pub fn search_interval(
        &self,
        files: &[FeatureFile],
        chromosome_id: ChromosomeId,
        start: u64,
        end: u64,
        types: &[FeatureType],
    ) -> Result<SearchResult> {
        if files.is_empty() {
            return Ok(SearchResult::empty());
        }
        let collection = self.open_collection(files)?;
        let query = filter::interval_query(collection.schema(), chromosome_id, start, end, types);
        let (entries, total) =
            collection.search(&*query, &SortSpec::default(), 0, self.max_search_results, None)?;
        Ok(SearchResult {
            entries,
            total_results_count: total,
            total_pages_count: None,
            exceeds_limit: total > self.max_search_results,
        })
    }

    /// Match counts per distinct value of `field` under the filter, without
    /// materializing matches. Ordered by descending count.
    pub fn group(
        &self,
        files: &[FeatureFile],
        spec: &FilterSpec,
        target: FeatureType,
        field: &str,
    ) -> Result<Vec<(String, u64)>> {
        let index_field = groupable_field(field)
            .ok_or_else(|| Error::InvalidFilter(format!("cannot group by field '{field}'")))?;
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.open_collection(files)?;
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
        let compiled = filter::compile(spec, target, collection.schema(), &file_ids)?;
        collection.terms_count(&*compiled.query, index_field)
    }

    /// Chromosomes holding at least one match for the filter, via a terms
    /// aggregation rather than a scan.
    pub fn chromosomes_with_matches(
        &self,
        files: &[FeatureFile],
        spec: &FilterSpec,
        target: FeatureType,
    ) -> Result<Vec<ChromosomeId>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.open_collection(files)?;
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
        let compiled = filter::compile(spec, target, collection.schema(), &file_ids)?;

        let mut ids = Vec::new();
        for (value, count) in collection.terms_count(&*compiled.query, schema::CHROMOSOME_ID)? {
            if count == 0 {
                continue;
            }
            let id: ChromosomeId = value.parse().map_err(|_| {
                Error::Internal(format!("non-numeric chromosome aggregation key '{value}'"))
            })?;
            ids.push(id);
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Distinct indexed values of a groupable field across `files`
    pub fn distinct_values(&self, files: &[FeatureFile], field: &str) -> Result<Vec<String>> {
        let index_field = groupable_field(field)
            .ok_or_else(|| Error::InvalidFilter(format!("cannot enumerate field '{field}'")))?;
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.open_collection(files)?;
        collection.distinct_values(index_field)
    }

    /// Opens the per-file indexes as one collection, failing fast on any
    /// file whose index was never built.
    fn open_collection(&self, files: &[FeatureFile]) -> Result<IndexCollection> {
        for file in files {
            if !self.file_store.index_exists(file) {
                return Err(Error::IndexNotFound(format!(
                    "{} (id {})",
                    file.name, file.id
                )));
            }
        }
        let dirs: Vec<PathBuf> = files.iter().map(|f| self.file_store.index_dir(f)).collect();
        IndexCollection::open(&dirs)
    }
}

/// Fields exposed for grouping and value enumeration. These are the fast
/// fields of the schema; grouping by anything else is rejected up front.
fn groupable_field(name: &str) -> Option<&'static str> {
    match name {
        "chromosome_name" => Some(schema::CHROMOSOME_NAME),
        "variation_type" => Some(schema::VARIATION_TYPE),
        "feature_type" => Some(schema::FEATURE_TYPE),
        "quality" => Some(schema::QUALITY),
        "failed_filter" => Some(schema::FAILED_FILTER),
        _ => None,
    }
}

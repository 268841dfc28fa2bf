//! Filter compilation: a declarative [`FilterSpec`] becomes one conjunctive
//! query plus a resolved sort order.
//!
//! Compilation validates caller input before any index access: paging must
//! be fully specified or fully absent, and text prefixes shorter than
//! [`MIN_PREFIX_LEN`] are rejected.

use std::ops::Bound;

use serde::{Deserialize, Serialize};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use super::schema::{self, FeatureSchema};
use crate::types::{ChromosomeId, FeatureType, FileId, VariationType};
use crate::{Error, Result};

/// Minimum length of a feature-id/gene prefix predicate
pub const MIN_PREFIX_LEN: usize = 2;

/// Declarative search specification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Refines the target feature types of the operation
    pub feature_types: Option<Vec<FeatureType>>,
    pub chromosome_ids: Option<Vec<ChromosomeId>>,
    /// Lower bound on a record's start index
    pub start_from: Option<u64>,
    /// Upper bound on a record's end index
    pub end_to: Option<u64>,
    pub variation_types: Option<Vec<VariationType>>,
    /// Prefix over associated gene ids/names; min length 2
    pub genes: Option<Vec<String>>,
    /// Prefix over feature id/name; min length 2
    pub feature_id_prefix: Option<String>,
    /// Variant info keys to project into results
    pub info_fields: Option<Vec<String>>,
    pub sort: Option<SortRequest>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl FilterSpec {
    /// Paging is all-or-nothing; checked before any index access
    pub fn validate_paging(&self) -> Result<()> {
        match (self.page, self.page_size) {
            (Some(_), None) | (None, Some(_)) => Err(Error::InvalidFilter(
                "page and page_size must be specified together".to_string(),
            )),
            (Some(page), Some(size)) if page == 0 || size == 0 => Err(Error::InvalidFilter(
                "page and page_size must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_paged(&self) -> bool {
        self.page.is_some() && self.page_size.is_some()
    }
}

/// Caller-facing sort request; unknown fields fall back to the default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRequest {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// Sort fields the store can order by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Default stable total order: (chromosome, start, uid)
    SortKey,
    StartIndex,
    EndIndex,
    ChromosomeId,
    Quality,
}

impl SortBy {
    pub fn fast_field(&self) -> &'static str {
        match self {
            SortBy::SortKey => schema::SORT_KEY,
            SortBy::StartIndex => schema::START_INDEX,
            SortBy::EndIndex => schema::END_INDEX,
            SortBy::ChromosomeId => schema::CHROMOSOME_ID,
            SortBy::Quality => schema::QUALITY,
        }
    }

    fn by_name(name: &str) -> Option<SortBy> {
        match name {
            "start_index" => Some(SortBy::StartIndex),
            "end_index" => Some(SortBy::EndIndex),
            "chromosome_id" => Some(SortBy::ChromosomeId),
            "quality" => Some(SortBy::Quality),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub by: SortBy,
    pub descending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec {
            by: SortBy::SortKey,
            descending: false,
        }
    }
}

/// A compiled filter: the query to run plus the resolved sort order
#[derive(Debug)]
pub struct CompiledQuery {
    pub query: Box<dyn Query>,
    pub sort: SortSpec,
}

/// Compiles a filter into a conjunctive query against `target` documents,
/// restricted to `file_ids` when non-empty. An empty spec compiles to
/// "all documents of the target type".
pub fn compile(
    spec: &FilterSpec,
    target: FeatureType,
    schema: &FeatureSchema,
    file_ids: &[FileId],
) -> Result<CompiledQuery> {
    spec.validate_paging()?;

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    let types = spec
        .feature_types
        .clone()
        .unwrap_or_else(|| vec![target]);
    clauses.push((Occur::Must, feature_type_clause(schema, &types)));

    if !file_ids.is_empty() {
        let files: Vec<(Occur, Box<dyn Query>)> = file_ids
            .iter()
            .map(|id| {
                (
                    Occur::Should,
                    term_query(Term::from_field_i64(schema.file_id, *id)),
                )
            })
            .collect();
        clauses.push((Occur::Must, Box::new(BooleanQuery::new(files))));
    }

    if let Some(chromosomes) = &spec.chromosome_ids {
        if chromosomes.is_empty() {
            return Err(Error::InvalidFilter(
                "chromosome_ids must not be empty when present".to_string(),
            ));
        }
        let chrs: Vec<(Occur, Box<dyn Query>)> = chromosomes
            .iter()
            .map(|id| {
                (
                    Occur::Should,
                    term_query(Term::from_field_i64(schema.chromosome_id, *id)),
                )
            })
            .collect();
        clauses.push((Occur::Must, Box::new(BooleanQuery::new(chrs))));
    }

    if let Some(start) = spec.start_from {
        clauses.push((
            Occur::Must,
            Box::new(RangeQuery::new(
                Bound::Included(Term::from_field_u64(schema.start_index, start)),
                Bound::Unbounded,
            )),
        ));
    }
    if let Some(end) = spec.end_to {
        clauses.push((
            Occur::Must,
            Box::new(RangeQuery::new(
                Bound::Unbounded,
                Bound::Included(Term::from_field_u64(schema.end_index, end)),
            )),
        ));
    }

    if let Some(types) = &spec.variation_types {
        let vts: Vec<(Occur, Box<dyn Query>)> = types
            .iter()
            .map(|vt| {
                (
                    Occur::Should,
                    term_query(Term::from_field_text(
                        schema.variation_type,
                        vt.as_index_value(),
                    )),
                )
            })
            .collect();
        clauses.push((Occur::Must, Box::new(BooleanQuery::new(vts))));
    }

    if let Some(genes) = &spec.genes {
        let mut gene_clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for gene in genes {
            let prefix = checked_prefix(gene)?;
            gene_clauses.push((Occur::Should, prefix_query(schema.gene_ids, &prefix)));
            gene_clauses.push((Occur::Should, prefix_query(schema.gene_names, &prefix)));
        }
        clauses.push((Occur::Must, Box::new(BooleanQuery::new(gene_clauses))));
    }

    if let Some(id_prefix) = &spec.feature_id_prefix {
        let prefix = checked_prefix(id_prefix)?;
        clauses.push((
            Occur::Must,
            Box::new(BooleanQuery::new(vec![
                (Occur::Should, prefix_query(schema.feature_id, &prefix)),
                (Occur::Should, prefix_query(schema.feature_name, &prefix)),
            ])),
        ));
    }

    let sort = resolve_sort(spec.sort.as_ref());
    Ok(CompiledQuery {
        query: Box::new(BooleanQuery::new(clauses)),
        sort,
    })
}

/// Union over feature types; an empty list matches all documents
pub fn feature_type_clause(schema: &FeatureSchema, types: &[FeatureType]) -> Box<dyn Query> {
    if types.is_empty() {
        return Box::new(AllQuery);
    }
    let clauses: Vec<(Occur, Box<dyn Query>)> = types
        .iter()
        .map(|t| {
            (
                Occur::Should,
                term_query(Term::from_field_text(
                    schema.feature_type,
                    t.as_index_value(),
                )),
            )
        })
        .collect();
    Box::new(BooleanQuery::new(clauses))
}

/// Interval query: records starting or ending inside `[start, end]`, or
/// spanning the whole interval.
pub fn interval_query(
    schema: &FeatureSchema,
    chromosome_id: ChromosomeId,
    start: u64,
    end: u64,
    types: &[FeatureType],
) -> Box<dyn Query> {
    let starts_inside: Box<dyn Query> = Box::new(RangeQuery::new(
        Bound::Included(Term::from_field_u64(schema.start_index, start)),
        Bound::Included(Term::from_field_u64(schema.start_index, end)),
    ));
    let ends_inside: Box<dyn Query> = Box::new(RangeQuery::new(
        Bound::Included(Term::from_field_u64(schema.end_index, start)),
        Bound::Included(Term::from_field_u64(schema.end_index, end)),
    ));
    let spans: Box<dyn Query> = Box::new(BooleanQuery::new(vec![
        (
            Occur::Must,
            Box::new(RangeQuery::new(
                Bound::Unbounded,
                Bound::Excluded(Term::from_field_u64(schema.start_index, start)),
            )) as Box<dyn Query>,
        ),
        (
            Occur::Must,
            Box::new(RangeQuery::new(
                Bound::Excluded(Term::from_field_u64(schema.end_index, end)),
                Bound::Unbounded,
            )) as Box<dyn Query>,
        ),
    ]));

    Box::new(BooleanQuery::new(vec![
        (
            Occur::Must,
            term_query(Term::from_field_i64(schema.chromosome_id, chromosome_id)),
        ),
        (Occur::Must, feature_type_clause(schema, types)),
        (
            Occur::Must,
            Box::new(BooleanQuery::new(vec![
                (Occur::Should, starts_inside),
                (Occur::Should, ends_inside),
                (Occur::Should, spans),
            ])) as Box<dyn Query>,
        ),
    ]))
}

/// Prefix lookup over feature id and name for gene-type records
pub fn feature_prefix_query(schema: &FeatureSchema, prefix: &str) -> Result<Box<dyn Query>> {
    let prefix = checked_prefix(prefix)?;
    Ok(Box::new(BooleanQuery::new(vec![
        (
            Occur::Must,
            Box::new(BooleanQuery::new(vec![
                (Occur::Should, prefix_query(schema.feature_id, &prefix)),
                (Occur::Should, prefix_query(schema.feature_name, &prefix)),
            ])) as Box<dyn Query>,
        ),
        (
            Occur::Must,
            feature_type_clause(schema, &[FeatureType::Gene, FeatureType::Mrna]),
        ),
    ])))
}

fn resolve_sort(request: Option<&SortRequest>) -> SortSpec {
    match request {
        Some(r) => match SortBy::by_name(&r.field) {
            Some(by) => SortSpec {
                by,
                descending: r.descending,
            },
            // unknown sort field: fall back to the stable default order
            None => SortSpec::default(),
        },
        None => SortSpec::default(),
    }
}

fn checked_prefix(prefix: &str) -> Result<String> {
    // character count, not byte length: a single multibyte character is
    // still one character of prefix
    if prefix.chars().count() < MIN_PREFIX_LEN {
        return Err(Error::InvalidFilter(format!(
            "prefix '{prefix}' is shorter than the minimum of {MIN_PREFIX_LEN} characters"
        )));
    }
    Ok(prefix.to_lowercase())
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// Prefix match over the term dictionary of a tokenized field. Terms are
/// lowercased at index time, so the prefix must be lowercased too.
fn prefix_query(field: Field, prefix: &str) -> Box<dyn Query> {
    let upper = format!("{prefix}\u{10FFFF}");
    Box::new(RangeQuery::new(
        Bound::Included(Term::from_field_text(field, prefix)),
        Bound::Included(Term::from_field_text(field, &upper)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_must_be_all_or_nothing() {
        let mut spec = FilterSpec {
            page: Some(1),
            ..FilterSpec::default()
        };
        assert!(spec.validate_paging().is_err());

        spec.page_size = Some(50);
        assert!(spec.validate_paging().is_ok());
        assert!(spec.is_paged());

        spec.page = None;
        assert!(spec.validate_paging().is_err());
    }

    #[test]
    fn test_zero_page_rejected() {
        let spec = FilterSpec {
            page: Some(0),
            page_size: Some(10),
            ..FilterSpec::default()
        };
        assert!(spec.validate_paging().is_err());
    }

    #[test]
    fn test_short_prefix_rejected_before_index_access() {
        let schema = FeatureSchema::new();
        let spec = FilterSpec {
            feature_id_prefix: Some("b".to_string()),
            ..FilterSpec::default()
        };
        let err = compile(&spec, FeatureType::Gene, &schema, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[test]
    fn test_prefix_minimum_counts_characters_not_bytes() {
        // two bytes, one character: still below the minimum
        let err = checked_prefix("ß").unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));

        assert_eq!(checked_prefix("ßA").unwrap(), "ßa");
    }

    #[test]
    fn test_unknown_sort_field_falls_back_to_default() {
        let schema = FeatureSchema::new();
        let spec = FilterSpec {
            sort: Some(SortRequest {
                field: "no_such_field".to_string(),
                descending: true,
            }),
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, FeatureType::Variation, &schema, &[]).unwrap();
        assert_eq!(compiled.sort, SortSpec::default());
    }

    #[test]
    fn test_known_sort_field_resolves() {
        let schema = FeatureSchema::new();
        let spec = FilterSpec {
            sort: Some(SortRequest {
                field: "start_index".to_string(),
                descending: true,
            }),
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, FeatureType::Variation, &schema, &[1, 2]).unwrap();
        assert_eq!(compiled.sort.by, SortBy::StartIndex);
        assert!(compiled.sort.descending);
    }

    #[test]
    fn test_empty_spec_compiles() {
        let schema = FeatureSchema::new();
        let compiled = compile(
            &FilterSpec::default(),
            FeatureType::Variation,
            &schema,
            &[],
        )
        .unwrap();
        assert_eq!(compiled.sort, SortSpec::default());
        let _ = compiled.query;
    }
}

//! Chromosome name resolution and reference genome metadata.
//!
//! Feature files are inconsistent about the "chr" prefix ("1" vs "chr1"),
//! so contig resolution tries the raw name first and then the
//! prefix-toggled alternate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Chromosome, FeatureFile, FileId};

const CHR_PREFIX: &str = "chr";

/// Toggles the "chr" prefix of a contig name
pub fn canonical_alternate(name: &str) -> String {
    match name.strip_prefix(CHR_PREFIX) {
        Some(rest) => rest.to_string(),
        None => format!("{CHR_PREFIX}{name}"),
    }
}

/// Chromosome-name lookup table for one reference genome
#[derive(Debug, Clone, Default)]
pub struct ChromosomeMap {
    by_name: HashMap<String, Chromosome>,
}

impl ChromosomeMap {
    pub fn new(chromosomes: impl IntoIterator<Item = Chromosome>) -> Self {
        ChromosomeMap {
            by_name: chromosomes
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    /// Resolves a contig name, falling back to the "chr"-toggled alternate
    pub fn resolve(&self, contig: &str) -> Option<&Chromosome> {
        self.by_name
            .get(contig)
            .or_else(|| self.by_name.get(&canonical_alternate(contig)))
    }

    pub fn contains(&self, contig: &str) -> bool {
        self.resolve(contig).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// A reference genome with its associated annotation files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: i64,
    pub name: String,
    pub chromosomes: Vec<Chromosome>,
    /// The designated gene file of this reference, if registered
    pub gene_file: Option<FeatureFile>,
    pub annotation_files: Vec<FeatureFile>,
}

impl Reference {
    pub fn chromosome_map(&self) -> ChromosomeMap {
        ChromosomeMap::new(self.chromosomes.iter().cloned())
    }

    pub fn chromosome_by_name(&self, name: &str) -> Option<&Chromosome> {
        self.chromosomes
            .iter()
            .find(|c| c.name == name || c.name == canonical_alternate(name))
    }

    /// Files to search for gene lookups: the designated gene file plus any
    /// gene-format annotation files, de-duplicated by file identity.
    pub fn gene_search_files(&self) -> Vec<FeatureFile> {
        let mut seen: Vec<FileId> = Vec::new();
        let mut files = Vec::new();

        let candidates = self
            .gene_file
            .iter()
            .chain(self.annotation_files.iter().filter(|f| f.format.is_gene()));
        for file in candidates {
            if !seen.contains(&file.id) {
                seen.push(file.id);
                files.push(file.clone());
            }
        }

        files
    }
}

//! Bookmark search collaborator.
//!
//! Bookmarks are user-saved named locations. Feature lookups always run a
//! bookmark search first and place its hits ahead of index results; the
//! two record kinds are never de-duplicated against each other.

use uuid::Uuid;

use crate::types::{Chromosome, FeatureKind, FeatureRecord, FeatureType, SearchResult};
use crate::Result;

#[derive(Debug, Clone)]
pub struct Bookmark {
    pub id: i64,
    pub name: String,
    pub chromosome: Chromosome,
    pub start_index: u64,
    pub end_index: u64,
}

pub trait BookmarkSearcher: Send + Sync {
    /// Case-insensitive prefix search over bookmark names
    fn search_bookmarks(&self, text: &str, limit: usize) -> Result<SearchResult>;
}

#[derive(Debug, Default)]
pub struct InMemoryBookmarks {
    bookmarks: Vec<(Uuid, Bookmark)>,
}

impl InMemoryBookmarks {
    pub fn new() -> Self {
        InMemoryBookmarks::default()
    }

    pub fn add(&mut self, bookmark: Bookmark) {
        self.bookmarks.push((Uuid::new_v4(), bookmark));
    }
}

impl BookmarkSearcher for InMemoryBookmarks {
    fn search_bookmarks(&self, text: &str, limit: usize) -> Result<SearchResult> {
        let needle = text.to_lowercase();
        let entries: Vec<FeatureRecord> = self
            .bookmarks
            .iter()
            .filter(|(_, b)| b.name.to_lowercase().starts_with(&needle))
            .take(limit)
            .map(|(uid, b)| FeatureRecord {
                uid: *uid,
                // bookmarks belong to no feature file
                file_id: 0,
                chromosome_id: b.chromosome.id,
                chromosome_name: b.chromosome.name.clone(),
                start_index: b.start_index,
                end_index: b.end_index,
                feature_id: Some(b.name.clone()),
                feature_name: Some(b.name.clone()),
                feature_type: FeatureType::Bookmark,
                kind: FeatureKind::Interval,
            })
            .collect();

        let total = entries.len();
        Ok(SearchResult {
            entries,
            total_results_count: total,
            total_pages_count: None,
            exceeds_limit: false,
        })
    }
}

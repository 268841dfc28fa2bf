//! Feature index: schema, construction, filter compilation and search.

pub mod builder;
pub mod filter;
pub mod schema;
pub mod search;
pub mod store;

pub use builder::{
    build_gene_index, build_gene_index_dual, build_interval_index, build_variant_index,
    BuildStats,
};
pub use filter::{FilterSpec, SortRequest};
pub use schema::FeatureSchema;
pub use search::SearchEngine;
pub use store::{delete_file_documents, FeatureSink, IndexCollection, IndexWriterHandle};

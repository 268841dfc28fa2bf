pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A search was requested against a file whose index was never built.
    /// Distinct from "zero results".
    #[error("feature index not found for file: {0}")]
    IndexNotFound(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A per-file build failed mid-stream. Batches flushed before the
    /// failure remain in the store; the caller owns cleanup.
    #[error("failed to build feature index for file {file}: {source}")]
    Build {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("histogram error: {0}")]
    Histogram(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index store error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Tags an error with the identity of the file whose build it aborted.
    pub fn build(file: &crate::types::FeatureFile, source: Error) -> Self {
        Error::Build {
            file: format!("{} (id {})", file.name, file.id),
            source: Box::new(source),
        }
    }
}

//! File-collaborator abstraction for on-disk artifacts.
//!
//! The engine itself does not decide where indexes and histograms live; a
//! [`FileStore`] supplies per-file index directories and persists computed
//! histogram tracks. [`LocalFileStore`] is the local-filesystem
//! implementation.

use std::fs;
use std::path::PathBuf;

use crate::types::{FeatureFile, HistogramBucket};
use crate::{Error, Result};

/// Storage collaborator for per-file indexes and histogram tracks
pub trait FileStore: Send + Sync {
    /// Directory holding the file's feature index
    fn index_dir(&self, file: &FeatureFile) -> PathBuf;

    /// Whether a committed index exists for the file
    fn index_exists(&self, file: &FeatureFile) -> bool;

    fn persist_histogram(
        &self,
        file: &FeatureFile,
        chromosome_name: &str,
        buckets: &[HistogramBucket],
    ) -> Result<()>;

    fn load_histogram(&self, file: &FeatureFile, chromosome_name: &str)
        -> Result<Vec<HistogramBucket>>;

    fn histogram_exists(&self, file: &FeatureFile, chromosome_name: &str) -> bool;
}

pub struct LocalFileStore {
    data_dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        LocalFileStore { data_dir }
    }

    fn file_dir(&self, file: &FeatureFile) -> PathBuf {
        self.data_dir.join(file.id.to_string())
    }

    fn histogram_path(&self, file: &FeatureFile, chromosome_name: &str) -> PathBuf {
        self.file_dir(file)
            .join("histogram")
            .join(format!("{chromosome_name}.json"))
    }
}

impl FileStore for LocalFileStore {
    fn index_dir(&self, file: &FeatureFile) -> PathBuf {
        self.file_dir(file).join("index")
    }

    fn index_exists(&self, file: &FeatureFile) -> bool {
        // keyed on the writer's commit marker; index metadata alone only
        // proves a build started, not that it completed
        self.index_dir(file)
            .join(crate::index::store::READY_MARKER)
            .exists()
    }

    fn persist_histogram(
        &self,
        file: &FeatureFile,
        chromosome_name: &str,
        buckets: &[HistogramBucket],
    ) -> Result<()> {
        let path = self.histogram_path(file, chromosome_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(buckets)?;
        fs::write(&path, json)?;
        tracing::debug!(file = file.id, chromosome = chromosome_name, "histogram persisted");
        Ok(())
    }

    fn load_histogram(
        &self,
        file: &FeatureFile,
        chromosome_name: &str,
    ) -> Result<Vec<HistogramBucket>> {
        let path = self.histogram_path(file, chromosome_name);
        let bytes = fs::read(&path).map_err(|_| {
            Error::NotFound(format!(
                "histogram for file {} chromosome {chromosome_name}",
                file.id
            ))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn histogram_exists(&self, file: &FeatureFile, chromosome_name: &str) -> bool {
        self.histogram_path(file, chromosome_name).exists()
    }
}

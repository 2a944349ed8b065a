//! Downstream capabilities the collection loop writes into.

pub mod export;
pub mod retry;
pub mod upload;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FeatureRow, NormalizedRecord};

pub use export::{write_readings_json, write_run_summary, CsvFeatureExporter, RunSummary};
pub use retry::{RetryPolicy, RetryableSink};
pub use upload::{DisabledUpload, FieldMapping, HttpUploadSink};

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("batch of {len} records exceeds the upload limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Upload(err.to_string())
    }
}

impl From<csv::Error> for SinkError {
    fn from(err: csv::Error) -> Self {
        SinkError::Export(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Export(err.to_string())
    }
}

/// Durable storage for normalized records.
///
/// Duplicate inserts on retry are acceptable.
#[async_trait]
pub trait PersistSink: Send + Sync {
    async fn persist(&self, record: &NormalizedRecord) -> SinkResult<()>;

    /// Reachability probe run once before a collection starts.
    async fn check(&self) -> SinkResult<()>;
}

/// Forwarding to the analytics store.
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Largest batch a single `upload` call accepts.
    fn max_batch(&self) -> usize;

    async fn upload(&self, batch: &[NormalizedRecord]) -> SinkResult<()>;
}

/// Writes a finished feature table somewhere.
pub trait Exporter {
    /// Returns the path actually written.
    fn write_features(&self, rows: &[FeatureRow], destination: &Path) -> SinkResult<PathBuf>;
}

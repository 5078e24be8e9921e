//! Typed failures of the ingestion pipeline.

use thiserror::Error;

/// Why a single feed source could not be fetched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("http status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("reading body failed: {0}")]
    Body(String),
}

/// Failure of a whole ingestion pass.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no feed sources configured")]
    NoSources,

    #[error("all {failed} feed sources failed")]
    AllSourcesFailed { failed: usize },
}

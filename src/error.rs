//! Pipeline-wide error taxonomy.
//!
//! Every component returns `Result<_, PipelineError>`. The variants mirror
//! the error kinds enumerated for the pipeline: upstream feed failures,
//! analyzer failures, store/queue failures, and validation failures. Policy
//! for each kind (retry, fall back, drop, or propagate) lives with the
//! caller, not here — this type only classifies.

use std::time::Duration;
use thiserror::Error;

/// Error produced by any pipeline component.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upstream feed requires organization/delegated-admin view and it
    /// is not enabled. Fatal: the pipeline cannot run without it.
    #[error("organization view is not enabled for the health feed: {0}")]
    UpstreamAuth(String),

    /// The upstream feed throttled the request. Transient, retried by the
    /// caller's own backoff policy.
    #[error("upstream feed throttled: {0}")]
    UpstreamThrottle(String),

    /// The upstream feed returned a response the adapter could not
    /// normalize (missing fields, unexpected shape). The caller drops the
    /// single event and continues.
    #[error("invalid upstream event payload: {0}")]
    UpstreamInvalid(String),

    /// The analyzer was throttled. Retried per the analyzer's own backoff
    /// schedule; see [`crate::llm::backoff`].
    #[error("analyzer throttled: {0}")]
    AnalyzerThrottle(String),

    /// The analyzer is unreachable after exhausting retries. Callers fall
    /// back to a deterministic analysis rather than propagate this.
    #[error("analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),

    /// A write lost a last-writer-wins race in a way the store surfaces
    /// explicitly (rare; most races resolve silently via upsert).
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// The store could not be reached or the write failed outright. Inside
    /// a worker this becomes a batch item failure so the queue redelivers.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The work queue could not accept or deliver a message.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// An external call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Caller-supplied input failed validation (e.g. an empty batch, a
    /// malformed trigger payload).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The requested record or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    /// Whether this error kind is retried locally by the component that
    /// produced it, rather than propagated.
    pub fn is_locally_retried(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamThrottle(_) | PipelineError::AnalyzerThrottle(_)
        )
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::StoreUnavailable(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

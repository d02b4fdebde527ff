//! Why an enrichment attempt did not produce an accepted record.

use thiserror::Error;

use crate::fetcher::FetchError;
use crate::llm::LlmError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("no usable target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("quality score {score:.2} at or below acceptance threshold")]
    LowQuality { score: f64 },

    /// Rejected, and the analysis output was malformed or partial.
    #[error("quality score {score:.2} with malformed analysis output: {reason}")]
    Degraded { score: f64, reason: String },

    #[error("analysis service unavailable: {0}")]
    Extraction(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("attempt timed out after {0}s")]
    Timeout(u64),

    /// The worker running the attempt panicked or was aborted.
    #[error("worker crashed: {0}")]
    Crashed(String),
}

impl From<LlmError> for AttemptError {
    fn from(err: LlmError) -> Self {
        Self::Extraction(err.to_string())
    }
}

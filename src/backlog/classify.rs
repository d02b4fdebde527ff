//! Failure classification.

use serde::{Deserialize, Serialize};

use crate::pipeline::AttemptError;

/// How the scheduler treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network trouble, service outages, low quality. Retry later.
    Transient,
    /// Malformed or partial analysis output. Retry later.
    Degraded,
    /// Retrying cannot help.
    Permanent,
    /// The record store rejected the write. Tracked apart from retries.
    Persistence,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Degraded => "degraded",
            Self::Permanent => "permanent",
            Self::Persistence => "persistence",
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// Classify an attempt failure.
pub fn classify(err: &AttemptError) -> ErrorClass {
    match err {
        AttemptError::InvalidTarget(_) => ErrorClass::Permanent,
        AttemptError::Fetch(e) if e.is_permanent() => ErrorClass::Permanent,
        AttemptError::Fetch(_) => ErrorClass::Transient,
        AttemptError::LowQuality { .. } => ErrorClass::Transient,
        AttemptError::Degraded { .. } => ErrorClass::Degraded,
        AttemptError::Extraction(_) => ErrorClass::Transient,
        AttemptError::Timeout(_) | AttemptError::Crashed(_) => ErrorClass::Transient,
        AttemptError::Persistence(_) => ErrorClass::Persistence,
    }
}

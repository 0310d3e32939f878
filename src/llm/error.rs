//! Analyzer error classification: distinguishes throttling (retried per the
//! advanced retry schedule in [`super::backoff`]) from everything else
//! (not retried — the caller falls back to the deterministic analysis).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The model endpoint throttled the request (`ThrottlingException` or
    /// HTTP 429). Retried with staggered, escalating backoff.
    #[error("analyzer throttled: {0}")]
    Throttled(String),

    /// Any other client/server error. Not retried.
    #[error("analyzer request failed: {0}")]
    RequestFailed(String),

    /// The model responded but the body could not be parsed into the
    /// expected JSON shape.
    #[error("analyzer response could not be parsed: {0}")]
    ParseFailed(String),
}

impl AnalyzerError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, AnalyzerError::Throttled(_))
    }

    pub fn classify_http_status(status: u16, body: impl Into<String>) -> Self {
        if status == 429 {
            AnalyzerError::Throttled(body.into())
        } else {
            AnalyzerError::RequestFailed(format!("HTTP {status}: {}", body.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_throttled() {
        assert!(AnalyzerError::classify_http_status(429, "slow down").is_throttled());
        assert!(!AnalyzerError::classify_http_status(500, "oops").is_throttled());
    }
}

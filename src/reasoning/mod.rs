//! Reasoning-service collaborator.
//!
//! Given a document, returns a structured classification proposal plus a
//! confidence self-estimate and token usage. The error type distinguishes
//! transient overload (retry-safe, aborts the current cycle without any
//! archive write) from permanent failures (marked as errors on the
//! document).

pub mod client;
pub mod pricing;
pub mod prompt;
pub mod proposal;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service misconfigured: {0}")]
    Config(String),

    #[error("cannot reach reasoning service at {0}")]
    Connection(String),

    /// Rate limit or upstream overload. Retry-safe: the caller must abort
    /// the current cycle and leave the document untouched.
    #[error("reasoning service overloaded (HTTP {status})")]
    Overloaded { status: u16 },

    #[error("reasoning service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("reasoning request failed: {0}")]
    Http(String),

    #[error("could not parse reasoning response: {0}")]
    MalformedResponse(String),
}

impl ReasoningError {
    /// True for failures that resolve on their own: never written to the
    /// archive, retried in a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_overload_is_transient() {
        assert!(ReasoningError::Overloaded { status: 429 }.is_transient());
        assert!(ReasoningError::Overloaded { status: 529 }.is_transient());
        assert!(!ReasoningError::Api {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ReasoningError::MalformedResponse("bad json".into()).is_transient());
        assert!(!ReasoningError::Connection("localhost".into()).is_transient());
    }
}

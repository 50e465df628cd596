//! Typed error hierarchy for the pipeline client.
//!
//! Three top-level enums cover the three subsystems:
//! - `SubmitError` — job submission failures (local validation and remote rejection)
//! - `PollError` — transport/parse failures while polling status
//! - `AggregationError` — post-completion artifact fetch/join failures

use thiserror::Error;

/// Errors from submitting a job to the pipeline service.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Bad local input; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The remote service rejected the submit.
    #[error("pipeline failed to start: {message}")]
    Startup { status: u16, message: String },

    /// The service could not be reached at all.
    #[error("failed to contact the pipeline service")]
    Transport(#[from] reqwest::Error),
}

/// Errors from a single status poll.
///
/// Every variant counts toward the consecutive-failure budget in
/// `RetryPolicy`; an expected "session not yet visible" 404 is *not* an
/// error and is reported as a `PollResult` variant instead.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("status request failed")]
    Request(#[source] reqwest::Error),

    #[error("status endpoint returned HTTP {status}")]
    Http { status: u16 },

    #[error("malformed status response")]
    Malformed(#[source] serde_json::Error),
}

/// Errors from fetching or joining result artifacts after completion.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to fetch artifact {artifact}")]
    Fetch {
        artifact: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("artifact {artifact} returned HTTP {status}")]
    Http { artifact: String, status: u16 },

    #[error("artifact {artifact} is not valid JSON")]
    Malformed {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact {artifact} has an unexpected shape: {reason}")]
    Shape { artifact: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_its_message_verbatim() {
        let err = SubmitError::Validation("entry count must be between 1 and 1000".into());
        assert_eq!(err.to_string(), "entry count must be between 1 and 1000");
    }

    #[test]
    fn startup_error_is_matchable_and_carries_status() {
        let err = SubmitError::Startup {
            status: 422,
            message: "Dataset must be 'ILC' or 'IN-ABS'".into(),
        };
        match &err {
            SubmitError::Startup { status, message } => {
                assert_eq!(*status, 422);
                assert!(message.contains("ILC"));
            }
            _ => panic!("Expected Startup variant"),
        }
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn poll_http_error_carries_status() {
        let err = PollError::Http { status: 502 };
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn poll_malformed_preserves_source() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err = PollError::Malformed(parse_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn aggregation_errors_name_the_artifact() {
        let err = AggregationError::Http {
            artifact: "rouge_ilc".into(),
            status: 404,
        };
        assert!(err.to_string().contains("rouge_ilc"));
        assert!(err.to_string().contains("404"));

        let err = AggregationError::Shape {
            artifact: "cleaned".into(),
            reason: "expected a JSON array".into(),
        };
        assert!(err.to_string().contains("expected a JSON array"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&SubmitError::Validation("x".into()));
        assert_std_error(&PollError::Http { status: 500 });
        assert_std_error(&AggregationError::Shape {
            artifact: "cleaned".into(),
            reason: "x".into(),
        });
    }
}

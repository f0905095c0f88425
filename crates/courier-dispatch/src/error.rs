//! Error taxonomy for dispatched requests.

use bytes::Bytes;
use thiserror::Error;

use crate::headers::Headers;

/// Every way a dispatched request can fail.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No response was obtained (DNS, refused connection, reset).
    #[error("transport failure: {reason}")]
    Transport {
        /// What went wrong below HTTP.
        reason: String,
        /// Log id of the failed request.
        context: String,
    },

    /// The request timed out before any response arrived.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Limit that was exceeded.
        timeout_ms: u64,
    },

    /// The server answered with a status of 400 or above.
    #[error("HTTP {status}: {context}")]
    HttpStatus {
        /// Received status.
        status: u16,
        /// Response headers.
        headers: Headers,
        /// Raw response body.
        body: Bytes,
        /// Log id of the failed request.
        context: String,
    },

    /// The status looked successful but the body failed its checks.
    #[error("invalid response body (HTTP {status}): {reason}")]
    Validation {
        /// Received status.
        status: u16,
        /// Response headers.
        headers: Headers,
        /// Raw response body.
        body: Bytes,
        /// Which check failed.
        reason: String,
    },

    /// Registration started twice, or finished without the outstanding token.
    #[error("registration gate misuse: {0}")]
    GateMisuse(&'static str),

    /// A bulk transfer was aborted by the failure of one part.
    #[error("bulk transfer aborted at part {index} after {completed} completed parts: {source}")]
    Batch {
        /// Submission index of the failed part.
        index: usize,
        /// Parts completed before the failure.
        completed: usize,
        /// Failure of that part.
        #[source]
        source: Box<DispatchError>,
    },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No operation has this call name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

impl DispatchError {
    /// Creates a transport failure with no context yet attached.
    pub fn transport(reason: impl Into<String>) -> Self {
        DispatchError::Transport {
            reason: reason.into(),
            context: String::new(),
        }
    }

    /// Numeric status for this failure; `0` means no response was received.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::HttpStatus { status, .. } => *status,
            DispatchError::Validation { status, .. } => *status,
            DispatchError::Batch { source, .. } => source.status(),
            _ => 0,
        }
    }

    /// Headers returned by the server, if any.
    pub fn headers(&self) -> Option<&Headers> {
        match self {
            DispatchError::HttpStatus { headers, .. } => Some(headers),
            DispatchError::Validation { headers, .. } => Some(headers),
            DispatchError::Batch { source, .. } => source.headers(),
            _ => None,
        }
    }

    /// Raw body returned by the server, if any.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            DispatchError::HttpStatus { body, .. } => Some(body),
            DispatchError::Validation { body, .. } => Some(body),
            DispatchError::Batch { source, .. } => source.body(),
            _ => None,
        }
    }

    /// Returns `true` only for pure transport failures (status `0`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport { .. } | DispatchError::Timeout { .. }
        )
    }

    /// Attaches the request's log id to transport and status failures.
    pub(crate) fn with_context(self, log_id: &str) -> Self {
        match self {
            DispatchError::Transport { reason, .. } => DispatchError::Transport {
                reason,
                context: log_id.to_string(),
            },
            DispatchError::HttpStatus {
                status,
                headers,
                body,
                ..
            } => DispatchError::HttpStatus {
                status,
                headers,
                body,
                context: log_id.to_string(),
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_class_is_retryable() {
        assert!(DispatchError::transport("refused").is_retryable());
        assert!(DispatchError::Timeout { timeout_ms: 10 }.is_retryable());

        assert!(!DispatchError::Cancelled.is_retryable());
        assert!(!DispatchError::GateMisuse("double start").is_retryable());
        assert!(!DispatchError::HttpStatus {
            status: 500,
            headers: Headers::new(),
            body: Bytes::new(),
            context: String::new(),
        }
        .is_retryable());
        assert!(!DispatchError::Validation {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
            reason: "missing field".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DispatchError::transport("reset").status(), 0);
        assert_eq!(DispatchError::Timeout { timeout_ms: 1 }.status(), 0);
        let err = DispatchError::HttpStatus {
            status: 413,
            headers: Headers::new(),
            body: Bytes::from_static(b"slow down"),
            context: String::new(),
        };
        assert_eq!(err.status(), 413);
        assert_eq!(err.body().map(|b| b.as_ref()), Some(&b"slow down"[..]));
    }

    #[test]
    fn test_batch_exposes_inner_status() {
        let err = DispatchError::Batch {
            index: 3,
            completed: 2,
            source: Box::new(DispatchError::HttpStatus {
                status: 403,
                headers: Headers::new(),
                body: Bytes::new(),
                context: String::new(),
            }),
        };
        assert_eq!(err.status(), 403);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("part 3"));
    }

    #[test]
    fn test_with_context_fills_log_id() {
        let err = DispatchError::transport("dns").with_context("GET (REST) https://x/y");
        match err {
            DispatchError::Transport { context, .. } => {
                assert_eq!(context, "GET (REST) https://x/y")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

//! Errors surfaced by the SQS client seam.
//!
//! SDK failures are classified at the boundary so the drain loop can decide
//! between retrying, giving up on one poller, or aborting before any poller
//! starts.
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Service error codes SQS returns for conditions that clear up on their own.
const TRANSIENT_CODES: &[&str] = &[
    "RequestThrottled",
    "ThrottlingException",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "KmsThrottled",
];

#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue name does not resolve to a URL. Never retried.
    #[error("queue '{0}' does not exist")]
    NotFound(String),

    /// Network, timeout and throttling failures.
    #[error("{operation} failed transiently: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} rejected ({code}): {message}")]
    Api {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("malformed {operation} response: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },

    #[error("could not build {operation} request: {message}")]
    InvalidRequest {
        operation: &'static str,
        message: String,
    },
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Transient { .. })
    }

    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        QueueError::Transient {
            operation,
            message: message.into(),
        }
    }

    /// Classify an SDK failure for `operation`.
    pub fn from_sdk<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        let message = DisplayErrorContext(&err).to_string();
        match &err {
            SdkError::ServiceError(ctx) => {
                let code = ctx.err().code().unwrap_or("Unknown").to_string();
                if TRANSIENT_CODES.contains(&code.as_str()) {
                    QueueError::Transient { operation, message }
                } else {
                    QueueError::Api {
                        operation,
                        code,
                        message,
                    }
                }
            }
            SdkError::ConstructionFailure(_) => QueueError::InvalidRequest { operation, message },
            // dispatch, timeout and unparseable responses
            _ => QueueError::Transient { operation, message },
        }
    }
}

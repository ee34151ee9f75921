//! Error types shared by the MPI job tracker crates
//!
//! Errors carry enough context (field, operation) to be useful in logs
//! without a backtrace.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for shared tracker operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a job template
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid template field (e.g., "jobCategory")
        field: Option<String>,
    },

    /// A resource quantity could not be parsed
    #[error("invalid quantity '{value}': {reason}")]
    InvalidQuantity {
        /// The rejected input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "poll_until")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error pointing at a template field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a quantity parse error
    pub fn invalid_quantity(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the caller may retry the failed operation unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube { .. } | Self::Internal { .. } => true,
            Self::Validation { .. } | Self::InvalidQuantity { .. } => false,
        }
    }
}

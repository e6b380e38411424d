//! Error types for rrdns
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors fall into two classes:
//! - **Fatal** (configuration and validation): surfaced before any backend
//!   mutation and abort the whole run. See [`Error::is_fatal`].
//! - **Operational** (backend/provider/transport): scoped to one record or
//!   one address and collected into the run report.
//!
//! Probe failures are never errors; they are folded into the health result.

use thiserror::Error;

/// Result type alias for rrdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rrdns
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TCP health probing requested without a port
    #[error("Configuration error: TCP health probe for {name}.{zone} requires a probe port")]
    MissingProbePort {
        /// Zone of the offending record
        zone: String,
        /// Record name
        name: String,
    },

    /// A zone referenced by the plan does not exist on the backend
    #[error("Zone not found on backend: {0}")]
    ZoneNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed plan row
    #[error("Plan row {row}: {message}")]
    Plan {
        /// 1-based row (CSV data row or JSON array index + 1)
        row: usize,
        /// What was wrong with it
        message: String,
    },

    /// Zone backend errors (list/add/remove failures)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading/writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-probe-port error for a record
    pub fn missing_probe_port(zone: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingProbePort {
            zone: zone.into(),
            name: name.into(),
        }
    }

    /// Create a zone-not-found error
    pub fn zone_not_found(zone: impl Into<String>) -> Self {
        Self::ZoneNotFound(zone.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a plan row error
    pub fn plan(row: usize, message: impl Into<String>) -> Self {
        Self::Plan {
            row,
            message: message.into(),
        }
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error belongs to the configuration/validation class
    ///
    /// Fatal errors abort a run before any backend mutation happens.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingProbePort { .. }
                | Self::ZoneNotFound(_)
                | Self::InvalidInput(_)
                | Self::Plan { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

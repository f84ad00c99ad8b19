//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidPayload         │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  SerializationFailed    │ │
//! │  │  ConfigLoad...  │  │  HttpStatus     │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │                                                   │
//! │  │                 │                                                   │
//! │  │  DatabaseError  │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing cloud link is not an error anywhere in this crate; it surfaces
//! as `None` credentials and a no-op pass.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid cloud URL.
    #[error("Invalid cloud URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the cloud.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The cloud answered with a non-2xx status.
    #[error("Cloud rejected request with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Stored payload could not be decoded for sending.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Failed to serialize a request body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a response body.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tally_db::DbError> for SyncError {
    fn from(err: tally_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<tally_core::CoreError> for SyncError {
    fn from(err: tally_core::CoreError) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_connect() {
            SyncError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt could succeed without intervention.
    ///
    /// Informational only: the engine retries every failed entry regardless.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) | SyncError::Http(_) => true,
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout("30s".into()).is_retryable());
        assert!(SyncError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(SyncError::HttpStatus { status: 429, body: String::new() }.is_retryable());

        assert!(!SyncError::HttpStatus { status: 400, body: String::new() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::InvalidPayload("v2".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!SyncError::DatabaseError("locked".into()).is_config_error());
    }

    #[test]
    fn test_store_and_payload_errors_convert() {
        let err = SyncError::from(tally_db::DbError::NotFound {
            entity: "OutboxEntry".into(),
            id: "e1".into(),
        });
        assert!(matches!(err, SyncError::DatabaseError(_)));
        assert!(!err.is_retryable());

        let err = SyncError::from(tally_core::CoreError::PayloadKindMismatch {
            expected: tally_core::EntityKind::Order,
            found: tally_core::EntityKind::Payment,
        });
        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::HttpStatus {
            status: 422,
            body: "missing localId".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("missing localId"));
    }
}

//! # Error Types
//!
//! Domain errors for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core  → CoreError   (payload decoding, unknown enum text)       │
//! │  tally-db    → DbError     (sqlx failures, row decoding)               │
//! │  tally-sync  → SyncError   (config, HTTP, channel, wraps the above)    │
//! │                                                                         │
//! │  Flow: CoreError → DbError → SyncError → tracing log                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::EntityKind;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored enum column held text that maps to no variant.
    ///
    /// ## When This Occurs
    /// - Rows written by a newer build with an extra entity kind
    /// - Manual edits to the database file
    #[error("Unknown {type_name} value: '{value}'")]
    UnknownVariant {
        type_name: &'static str,
        value: String,
    },

    /// Payload envelope carries a schema version this build cannot read.
    #[error("Unsupported payload schema version {found} (supported: {supported})")]
    UnsupportedPayloadVersion { found: u32, supported: u32 },

    /// Payload envelope is tagged with a different entity kind than its row.
    #[error("Payload kind mismatch: expected {expected}, found {found}")]
    PayloadKindMismatch {
        expected: EntityKind,
        found: EntityKind,
    },

    /// Payload text is not a valid envelope, or its data does not fit the kind.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl CoreError {
    /// Creates an UnknownVariant error.
    pub fn unknown_variant(type_name: &'static str, value: impl Into<String>) -> Self {
        CoreError::UnknownVariant {
            type_name,
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedPayload(err.to_string())
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::unknown_variant("EntityKind", "INVOICE");
        assert_eq!(err.to_string(), "Unknown EntityKind value: 'INVOICE'");

        let err = CoreError::PayloadKindMismatch {
            expected: EntityKind::Order,
            found: EntityKind::Payment,
        };
        assert!(err.to_string().contains("ORDER"));
        assert!(err.to_string().contains("PAYMENT"));
    }
}

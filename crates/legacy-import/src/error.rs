//! Error types for the import engine.

use thiserror::Error;

/// Main error type for import operations.
#[derive(Error, Debug)]
pub enum ImportError {
    /// A mode setter or parser received a value outside its closed set.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Lookup of an importer or segment by an unregistered key.
    #[error("{kind} could not be found by key `{key}`")]
    NotFound { kind: &'static str, key: String },

    /// A record presented for upsert lacks its natural key pair.
    #[error("Upsert precondition failed: {0}")]
    UpsertPrecondition(String),

    /// Derived write mode does not match any implemented branch.
    #[error("Unsupported write mode `{0}`")]
    UnsupportedWriteMode(String),

    /// Declared-but-unbuilt code path.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Caller passed an unusable argument (e.g. an empty batch).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure propagated unchanged from a source connector.
    #[error("Source error: {0}")]
    Source(String),

    /// Failure from the target storage engine or the configuration store.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    /// Create a NotFound error for an importer key.
    pub fn importer_not_found(key: impl Into<String>) -> Self {
        ImportError::NotFound {
            kind: "Importer",
            key: key.into(),
        }
    }

    /// Create a NotFound error for a segment key.
    pub fn segment_not_found(key: impl Into<String>) -> Self {
        ImportError::NotFound {
            kind: "Segment",
            key: key.into(),
        }
    }

    /// Create a Source error from any connector failure.
    pub fn source(err: impl std::fmt::Display) -> Self {
        ImportError::Source(err.to_string())
    }

    /// Create a Storage error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        ImportError::Storage(err.to_string())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Source(err.to_string())
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Source(err.to_string())
    }
}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = ImportError::importer_not_found("location");
        assert_eq!(
            err.to_string(),
            "Importer could not be found by key `location`"
        );
    }

    #[test]
    fn test_format_detailed() {
        let err = ImportError::InvalidConfiguration("bad mode".into());
        assert!(err.format_detailed().starts_with("Error: "));
    }
}

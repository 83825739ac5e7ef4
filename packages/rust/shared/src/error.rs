//! Error types for orgscout.
//!
//! Library crates use [`ScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The variants follow how far a failure is allowed to travel: schema and
//! workspace errors abort a run, search/fetch/extraction errors are absorbed
//! at the field or URL that raised them, validation errors stop one entity.

use std::path::PathBuf;

/// Top-level error type for all orgscout operations.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed schema document or unsupported field/attribute type.
    #[error("schema parse error: {message}")]
    SchemaParse { message: String },

    /// Empty query or search provider failure.
    #[error("search error: {0}")]
    Search(String),

    /// Navigation timeout or network failure while fetching a page.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Extraction backend failure or a response that does not fit the field shape.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A merged record that violates the schema.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization error for documents on disk.
    #[error("JSON error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema parse error from any displayable message.
    pub fn schema_parse(msg: impl Into<String>) -> Self {
        Self::SchemaParse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `serde_json::Error` with the path of the offending document.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ScoutError::schema_parse("unsupported field type \"number\"");
        assert!(err.to_string().starts_with("schema parse error:"));

        let err = ScoutError::validation("required field \"name\" is missing");
        assert!(err.to_string().contains("\"name\""));
    }

    #[test]
    fn io_error_keeps_path() {
        let err = ScoutError::io(
            "/tmp/run/acme-x.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("acme-x.json"));
    }
}

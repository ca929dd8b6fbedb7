//! Error types for settings, document access and rules loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading or writing a file failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Walking the corpus directory failed.
    #[error("failed to enumerate documents: {0}")]
    Walk(#[from] ignore::Error),
    /// The settings file was not valid JSON.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// No rules document exists at the computed path.
    #[error("rules file not found at '{path}'")]
    RuleFileMissing {
        /// The path that was looked up.
        path: String,
    },
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_file_missing_names_the_path() {
        let err = CoreError::RuleFileMissing {
            path: "Projects/rules.md".into(),
        };
        assert_eq!(
            err.to_string(),
            "rules file not found at 'Projects/rules.md'"
        );
    }

    #[test]
    fn io_error_display_includes_path() {
        let err = CoreError::io(
            "vault/a.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("vault/a.md"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Json(_)));
    }
}

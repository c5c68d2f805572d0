//! Error types for lesson loading and validation.

use std::path::PathBuf;

/// A specialized `Result` type for lesson operations.
pub type Result<T> = std::result::Result<T, LessonError>;

/// Errors that can occur while loading, parsing, or validating a lesson.
#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    /// The lesson manifest file does not exist.
    #[error("Lesson not found: '{path}'\n\nSuggestion: Check the path or create the lesson manifest")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The lesson manifest exceeds the size limit.
    #[error("Lesson exceeds size limit (256KB): '{path}' is {size_kb}KB\n\nSuggestion: Move large file contents out of the manifest")]
    TooLarge {
        /// Path of the oversized manifest.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// The lesson manifest is not valid UTF-8.
    #[error("Lesson has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    Encoding {
        /// Path of the malformed manifest.
        path: PathBuf,
    },

    /// The lesson manifest is not valid JSON.
    #[error("Invalid JSON in lesson '{path}': {message}\n\nSuggestion: Validate the manifest with a JSON linter")]
    Parse {
        /// Path of the malformed manifest.
        path: PathBuf,
        /// Parser error detail.
        message: String,
    },

    /// The lesson parsed but violates a structural constraint.
    #[error("Invalid lesson: {message}\n\nSuggestion: {suggestion}")]
    Validation {
        /// What is wrong.
        message: String,
        /// How to fix it.
        suggestion: String,
    },

    /// An underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LessonError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a new `TooLarge` error.
    #[must_use]
    pub fn too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::TooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(path: impl Into<PathBuf>) -> Self {
        Self::Encoding { path: path.into() }
    }

    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_carry_suggestions() {
        let err = LessonError::not_found("lessons/counter.json");
        assert!(err.to_string().contains("Suggestion"));

        let err = LessonError::validation("check weights sum to 0.5", "make weights sum to 1.0");
        let msg = err.to_string();
        assert!(msg.contains("0.5"));
        assert!(msg.contains("sum to 1.0"));
    }
}

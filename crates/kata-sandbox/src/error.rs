//! Error types for the kata sandbox.
//!
//! This module defines the error taxonomy for a single sandbox run:
//! compilation, import resolution, preflight rejection, runtime throws,
//! and timeout exceedance. Host failures are terminal for their run and
//! are reported through `SandboxState`, never as a rejected future.

use serde::{Deserialize, Serialize};

/// A specialized `Result` type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// A position in original (pre-transpile) source.
///
/// Lines are 1-based, columns 0-based, matching the source-map convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The file the location refers to.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 0-based column number.
    pub column: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Errors that can occur while compiling or executing learner code.
///
/// Variants are organized by run phase and include actionable suggestions
/// where the learner (or lesson author) can do something about them.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// Malformed source in a requested module. Surfaced, not retried.
    #[error("Compile error in '{file}': {message}")]
    Compilation {
        /// The file that failed to compile.
        file: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// A relative import did not resolve to any file in the run's file set.
    #[error("Cannot resolve import '{specifier}' from '{file}'\n\nSuggestion: Check the path; relative imports may omit the .ts/.tsx/.js/.jsx extension")]
    UnresolvedImport {
        /// The import specifier as written.
        specifier: String,
        /// The importing file.
        file: String,
    },

    /// A bare or absolute import outside the sandbox allowlist.
    ///
    /// Only the mocked runtime core and its JSX factory are importable;
    /// this is the sandbox's filesystem/network isolation boundary.
    #[error("Unsupported import '{specifier}' in '{file}'\n\nSuggestion: Only relative imports and the runtime core are available inside the sandbox")]
    ForbiddenImport {
        /// The import specifier as written.
        specifier: String,
        /// The importing file.
        file: String,
    },

    // ========================================================================
    // Preflight Rejection
    // ========================================================================
    /// A statically detected unbounded loop, rejected before execution.
    ///
    /// Distinct from a timeout: nothing was evaluated.
    #[error("Unbounded loop detected ('{pattern}') in '{file}'\n\nSuggestion: Add a terminating condition before running")]
    Preflight {
        /// The matched loop pattern.
        pattern: String,
        /// The file containing the pattern.
        file: String,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// An exception thrown during evaluation, with a best-effort remapped
    /// original-source location.
    #[error("{message}")]
    Runtime {
        /// The formatted error message.
        message: String,
        /// Original-source location, when remapping succeeded.
        location: Option<SourceLocation>,
    },

    /// Wall-clock budget exceeded during evaluation.
    #[error("Execution timed out after {budget_ms}ms\n\nSuggestion: Look for long or unbounded loops")]
    Timeout {
        /// The configured budget in milliseconds.
        budget_ms: u64,
    },
}

impl SandboxError {
    /// Creates a new `Compilation` error.
    #[must_use]
    pub fn compilation(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compilation {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnresolvedImport` error.
    #[must_use]
    pub fn unresolved_import(specifier: impl Into<String>, file: impl Into<String>) -> Self {
        Self::UnresolvedImport {
            specifier: specifier.into(),
            file: file.into(),
        }
    }

    /// Creates a new `ForbiddenImport` error.
    #[must_use]
    pub fn forbidden_import(specifier: impl Into<String>, file: impl Into<String>) -> Self {
        Self::ForbiddenImport {
            specifier: specifier.into(),
            file: file.into(),
        }
    }

    /// Creates a new `Preflight` rejection.
    #[must_use]
    pub fn preflight(pattern: impl Into<String>, file: impl Into<String>) -> Self {
        Self::Preflight {
            pattern: pattern.into(),
            file: file.into(),
        }
    }

    /// Creates a new `Runtime` error.
    #[must_use]
    pub fn runtime(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::Runtime {
            message: message.into(),
            location,
        }
    }

    /// Returns `true` if this error was raised before any evaluation began.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(
            self,
            Self::Compilation { .. }
                | Self::UnresolvedImport { .. }
                | Self::ForbiddenImport { .. }
                | Self::Preflight { .. }
        )
    }

    /// Returns `true` if this error is a wall-clock timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The message shown to the learner, with the remapped location (if any)
    /// appended in `file:line:col` form.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Runtime {
                message,
                location: Some(loc),
            } => format!("{message} ({loc})"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation {
            file: "App.tsx".to_string(),
            line: 12,
            column: 4,
        };
        assert_eq!(loc.to_string(), "App.tsx:12:4");
    }

    #[test]
    fn test_is_static() {
        assert!(SandboxError::compilation("a.ts", "bad").is_static());
        assert!(SandboxError::unresolved_import("./x", "a.ts").is_static());
        assert!(SandboxError::forbidden_import("fs", "a.ts").is_static());
        assert!(SandboxError::preflight("while(true){", "a.ts").is_static());
        assert!(!SandboxError::runtime("boom", None).is_static());
        assert!(!SandboxError::Timeout { budget_ms: 5000 }.is_static());
    }

    #[test]
    fn test_is_timeout() {
        assert!(SandboxError::Timeout { budget_ms: 5000 }.is_timeout());
        assert!(!SandboxError::runtime("boom", None).is_timeout());
    }

    #[test]
    fn test_display_message_with_location() {
        let err = SandboxError::runtime(
            "count is not defined",
            Some(SourceLocation {
                file: "Counter.tsx".to_string(),
                line: 7,
                column: 10,
            }),
        );
        assert_eq!(
            err.display_message(),
            "count is not defined (Counter.tsx:7:10)"
        );
    }

    #[test]
    fn test_forbidden_import_names_specifier() {
        let err = SandboxError::forbidden_import("node:fs", "main.ts");
        let msg = err.to_string();
        assert!(msg.contains("node:fs"));
        assert!(msg.contains("main.ts"));
        assert!(msg.contains("Suggestion"));
    }
}

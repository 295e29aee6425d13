//! Error/warning callback shape shared across the compiler/host boundary.
//!
//! Mirrors spec §6: `(message, token_location)` with
//! `token_location = {file, line, column}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A single source position, one-indexed for display (stored zero-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// A location for synthesized nodes that have no source text of their own
    /// (compiler-generated ctor calls, synthesized state classes, ...).
    pub fn synthetic() -> Self {
        SourceLocation {
            file: PathBuf::from("<synthesized>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line + 1, self.column + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic delivered to the host's error/warning callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable short identifier for the diagnostic kind (e.g. `"ambiguous-call"`,
    /// `"precision-loss"`), useful for host-side filtering/suppression.
    pub kind: &'static str,
    pub message: String,
    pub location: SourceLocation,
}

impl Diagnostic {
    pub fn error(kind: &'static str, message: impl Into<String>, location: SourceLocation) -> Self {
        Diagnostic {
            severity: Severity::Error,
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn warning(kind: &'static str, message: impl Into<String>, location: SourceLocation) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} [{}]: {}", self.location, sev, self.kind, self.message)
    }
}

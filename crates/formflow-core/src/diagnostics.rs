//! Diagnostics for recoverable faults
//!
//! Single diagnostic type used across schema load, expression evaluation,
//! and validator configuration. Schema content is untrusted, so most faults
//! are reported and worked around rather than propagated as hard errors.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Schema load
    DuplicateContentId,
    DuplicateControlName,
    InvalidPattern,

    // Expressions
    ExpressionSyntax,
    UnknownIdentifier,

    // Binding / rendering
    UnresolvedSelector,

    // Validation configuration & transport
    UnregisteredCustomValidator,
    AsyncTransportFailure,
}

/// A diagnostic message with severity, code, and the schema element it
/// concerns (a contentId, control name, or selector).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            subject: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            subject: None,
        }
    }

    /// Attach the schema element this diagnostic concerns
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_builder_sets_severity() {
        let diag = Diagnostic::error(DiagnosticCode::DuplicateContentId, "duplicate 'header'");
        assert!(diag.is_error());
        assert_eq!(diag.message, "duplicate 'header'");
    }

    #[test]
    fn warning_is_not_error() {
        let diag = Diagnostic::warning(DiagnosticCode::UnresolvedSelector, "#missing")
            .with_subject("#missing");
        assert!(!diag.is_error());
        assert_eq!(diag.subject.as_deref(), Some("#missing"));
    }
}

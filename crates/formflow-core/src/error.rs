//! Error taxonomy for the FormFlow engine
//!
//! Four families, matching how faults propagate: schema faults are
//! recoverable diagnostics, expression faults fail closed, validation
//! failures are per-control state, and transport faults degrade to a
//! generic validation failure.

use thiserror::Error;

/// Faults in supplied schema content. Reported as diagnostics; the engine
/// keeps operating on the remaining valid blocks.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate contentId '{0}'")]
    DuplicateContentId(String),

    #[error("duplicate control name '{0}' within scope")]
    DuplicateControlName(String),

    #[error("invalid pattern regex for control '{control}': {reason}")]
    InvalidPattern { control: String, reason: String },
}

/// Faults in a `showIf`/`disableWhen` expression. Evaluation fails closed
/// to `false`; the fault itself surfaces as a diagnostic, never a panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("expression syntax error: {0}")]
    Syntax(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
}

/// Faults reaching the async validator transport. Resolved as a failed
/// validation with a generic message; retry is a host concern.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("async validator request failed: {0}")]
    Send(String),

    #[error("async validator request timed out")]
    Timeout,
}

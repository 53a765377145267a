//! Synchronous validator registry
//!
//! One pure function per validator kind, executed in declared order with
//! short-circuit at the first failure. The first failing validator's message
//! is the one surfaced through the control's error-display selector, so
//! authors list `required` ahead of format validators.
//!
//! Cross-field (`match`) reads go through a read-only [`ControlValues`]
//! snapshot and never trigger the other control's own validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::schema::ValidatorSpec;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

// ============================================================================
// Capability: host-registered custom validators
// ============================================================================

/// A host-registered validator function. Returns true on pass.
pub type CustomValidatorFn = dyn Fn(&Value) -> bool + Send + Sync;

/// Host-provided function table for `custom` validators.
pub trait CustomValidators: Send + Sync {
    fn lookup(&self, key: &str) -> Option<&CustomValidatorFn>;
}

/// Empty table: every `custom` validator fails as unregistered.
pub struct NoCustomValidators;

impl CustomValidators for NoCustomValidators {
    fn lookup(&self, _key: &str) -> Option<&CustomValidatorFn> {
        None
    }
}

/// Simple map-backed table for hosts and tests.
#[derive(Default)]
pub struct CustomValidatorTable {
    entries: HashMap<String, Box<CustomValidatorFn>>,
}

impl CustomValidatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        validator: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.entries.insert(key.into(), Box::new(validator));
    }
}

impl CustomValidators for CustomValidatorTable {
    fn lookup(&self, key: &str) -> Option<&CustomValidatorFn> {
        self.entries.get(key).map(|b| b.as_ref())
    }
}

// ============================================================================
// Capability: read-only view of sibling control values
// ============================================================================

/// Snapshot of the owning graph's current values, for cross-field checks.
pub trait ControlValues {
    fn control_value(&self, name: &str) -> Option<Value>;
}

impl ControlValues for HashMap<String, Value> {
    fn control_value(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// A validator ready to run. `pattern` regexes compile once at control
/// creation; a regex that fails to compile becomes `Broken` and fails every
/// value it sees.
pub enum CompiledValidator {
    Spec(ValidatorSpec),
    Pattern { regex: Regex, message: String },
    Broken { message: String },
}

/// Compile a control's declared validators, reporting bad pattern regexes
/// as load-time diagnostics.
pub fn compile_validators(
    control: &str,
    specs: &[ValidatorSpec],
) -> (Vec<CompiledValidator>, Vec<Diagnostic>) {
    let mut compiled = Vec::with_capacity(specs.len());
    let mut diags = Vec::new();

    for spec in specs {
        match spec {
            ValidatorSpec::Pattern { regex, message } => {
                // Anchor: the whole value must match, as schema authors expect
                match Regex::new(&format!("^(?:{regex})$")) {
                    Ok(re) => compiled.push(CompiledValidator::Pattern {
                        regex: re,
                        message: message.clone(),
                    }),
                    Err(err) => {
                        warn!(control, %err, "pattern regex failed to compile");
                        diags.push(
                            Diagnostic::error(
                                DiagnosticCode::InvalidPattern,
                                format!("control '{control}': invalid pattern regex: {err}"),
                            )
                            .with_subject(control.to_string()),
                        );
                        compiled.push(CompiledValidator::Broken {
                            message: format!("control '{control}' has an invalid pattern"),
                        });
                    }
                }
            }
            other => compiled.push(CompiledValidator::Spec(other.clone())),
        }
    }

    (compiled, diags)
}

// ============================================================================
// Execution
// ============================================================================

/// Outcome of a validation pass over one control.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Pass,
    Fail { message: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    fn fail(message: &str) -> Self {
        Verdict::Fail {
            message: message.to_string(),
        }
    }
}

/// Run a control's validators in declared order, stopping at the first
/// failure.
pub fn run_validators(
    value: &Value,
    validators: &[CompiledValidator],
    values: &dyn ControlValues,
    custom: &dyn CustomValidators,
) -> Verdict {
    for validator in validators {
        let verdict = match validator {
            CompiledValidator::Spec(spec) => run_one(value, spec, values, custom),
            CompiledValidator::Pattern { regex, message } => {
                if regex.is_match(&text_of(value)) {
                    Verdict::Pass
                } else {
                    Verdict::fail(message)
                }
            }
            CompiledValidator::Broken { message } => Verdict::fail(message),
        };
        if !verdict.is_pass() {
            return verdict;
        }
    }
    Verdict::Pass
}

fn run_one(
    value: &Value,
    spec: &ValidatorSpec,
    values: &dyn ControlValues,
    custom: &dyn CustomValidators,
) -> Verdict {
    match spec {
        ValidatorSpec::Required { message } => {
            if is_empty(value) {
                Verdict::fail(message)
            } else {
                Verdict::Pass
            }
        }
        ValidatorSpec::RequiredTrue { message } => {
            if value == &Value::Bool(true) {
                Verdict::Pass
            } else {
                Verdict::fail(message)
            }
        }
        ValidatorSpec::Email { message } => {
            if EMAIL_RE.is_match(&text_of(value)) {
                Verdict::Pass
            } else {
                Verdict::fail(message)
            }
        }
        ValidatorSpec::MinLength { n, message } => {
            if text_len(value) >= *n {
                Verdict::Pass
            } else {
                Verdict::fail(message)
            }
        }
        ValidatorSpec::MaxLength { n, message } => {
            if text_len(value) <= *n {
                Verdict::Pass
            } else {
                Verdict::fail(message)
            }
        }
        ValidatorSpec::Min { n, message } => match number_of(value) {
            Some(v) if v >= *n => Verdict::Pass,
            _ => Verdict::fail(message),
        },
        ValidatorSpec::Max { n, message } => match number_of(value) {
            Some(v) if v <= *n => Verdict::Pass,
            _ => Verdict::fail(message),
        },
        // compiled separately
        ValidatorSpec::Pattern { message, .. } => Verdict::fail(message),
        ValidatorSpec::Match { other, message } => match values.control_value(other) {
            Some(other_value) if &other_value == value => Verdict::Pass,
            _ => Verdict::fail(message),
        },
        ValidatorSpec::Custom { key, message } => match custom.lookup(key) {
            Some(f) => {
                if f(value) {
                    Verdict::Pass
                } else {
                    Verdict::fail(message)
                }
            }
            // Fail safe: an unregistered key is a configuration error,
            // never a silent pass.
            None => Verdict::Fail {
                message: format!("custom validator '{key}' is not registered"),
            },
        },
    }
}

// ============================================================================
// Value coercion helpers
// ============================================================================

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Text rendering used by length/format validators. Containers have no
/// text form and read as empty.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn text_len(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        other => text_of(other).chars().count(),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

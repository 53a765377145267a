//! Content Block schema types
//!
//! A schema is an ordered sequence of Content Blocks supplied as untrusted
//! JSON. Each block carries opaque structure/style payloads plus four
//! declarative sub-lists: data bindings, form mappings, table bindings, and
//! button configs. Blocks are immutable once loaded; changing one means
//! replacing the whole schema for its scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::diagnostics::{Diagnostic, DiagnosticCode};

/// The action tag that triggers full-graph validation and submission.
pub const SUBMIT_ACTION: &str = "submit";

/// How a block's structure is rendered by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Inline,
    Modal,
}

/// One schema entry describing a renderable unit and its bindings/logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    pub content_id: String,
    #[serde(default)]
    pub render_mode: RenderMode,
    /// Opaque structure payload, handed to the host renderer untouched.
    #[serde(default)]
    pub structure: Value,
    /// Opaque style payload, handed to the host renderer untouched.
    #[serde(default)]
    pub style: Value,
    #[serde(default)]
    pub data_bindings: Vec<DataBinding>,
    #[serde(default)]
    pub form_mappings: Vec<FormMapping>,
    #[serde(default)]
    pub table_bindings: Vec<TableBinding>,
    #[serde(default)]
    pub button_configs: Vec<ButtonConfig>,
}

/// Selector + value to push to the rendered UI. Applying the same binding
/// twice is an observable no-op.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataBinding {
    pub selector: String,
    pub value: Value,
}

/// Declaration of one form control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMapping {
    /// Unique within the owning scope.
    pub control_name: String,
    pub selector: String,
    /// Where the first failing validator message is displayed.
    #[serde(default)]
    pub error_selector: Option<String>,
    /// Sync validators, executed in declared order with short-circuit.
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    #[serde(default)]
    pub async_validator: Option<AsyncValidatorSpec>,
    /// Applied once at control creation, before any external patch.
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub show_if: Option<String>,
    /// Format-only display mask (`#` digit, `A` letter, `*` any).
    #[serde(default)]
    pub mask: Option<String>,
}

/// Tagged sync validator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ValidatorSpec {
    Required { message: String },
    RequiredTrue { message: String },
    Email { message: String },
    MinLength { n: usize, message: String },
    MaxLength { n: usize, message: String },
    Min { n: f64, message: String },
    Max { n: f64, message: String },
    Pattern { regex: String, message: String },
    /// Cross-field equality against another control in the same scope.
    Match { other: String, message: String },
    /// Resolved against the host's custom-validator table.
    Custom { key: String, message: String },
}

impl ValidatorSpec {
    /// The human-readable message surfaced when this validator fails.
    pub fn message(&self) -> &str {
        match self {
            ValidatorSpec::Required { message }
            | ValidatorSpec::RequiredTrue { message }
            | ValidatorSpec::Email { message }
            | ValidatorSpec::MinLength { message, .. }
            | ValidatorSpec::MaxLength { message, .. }
            | ValidatorSpec::Min { message, .. }
            | ValidatorSpec::Max { message, .. }
            | ValidatorSpec::Pattern { message, .. }
            | ValidatorSpec::Match { message, .. }
            | ValidatorSpec::Custom { message, .. } => message,
        }
    }
}

/// Async validator configuration. Runs only after every sync validator for
/// the control passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncValidatorSpec {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Response key that, when truthy, marks the validation as failed.
    pub error_key: String,
    pub message: String,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Selector + column definitions + row data + row actions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBinding {
    pub selector: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default)]
    pub row_actions: Vec<RowAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub key: String,
    pub header: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowAction {
    pub label: String,
    pub action: String,
    #[serde(default)]
    pub style_class: Option<String>,
}

/// Button wiring: which element, which action tag, and when it disables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonConfig {
    pub selector: String,
    pub action: String,
    #[serde(default)]
    pub disable_when: Option<DisableWhen>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisableWhen {
    FormIsInvalid,
    FormIsPristine,
    FormIsInvalidOrPristine,
}

/// Parse a JSON array of Content Blocks.
pub fn parse_schema(json: &str) -> Result<Vec<ContentBlock>, crate::error::SchemaError> {
    Ok(serde_json::from_str(json)?)
}

/// Load-time uniqueness checks for one scope's block sequence.
///
/// Returns the blocks that survive (later duplicates dropped) and the
/// diagnostics for everything rejected. Duplicate `contentId` drops the
/// later block; a duplicate control name drops only that mapping.
pub fn check_schema(blocks: Vec<ContentBlock>) -> (Vec<ContentBlock>, Vec<Diagnostic>) {
    let mut diags = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_controls: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(blocks.len());

    for mut block in blocks {
        if !seen_ids.insert(block.content_id.clone()) {
            warn!(content_id = %block.content_id, "dropping block with duplicate contentId");
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateContentId,
                    format!("duplicate contentId '{}'", block.content_id),
                )
                .with_subject(block.content_id.clone()),
            );
            continue;
        }

        block.form_mappings.retain(|mapping| {
            if seen_controls.insert(mapping.control_name.clone()) {
                true
            } else {
                warn!(
                    control = %mapping.control_name,
                    "dropping mapping with duplicate control name"
                );
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::DuplicateControlName,
                        format!(
                            "duplicate control name '{}' within scope",
                            mapping.control_name
                        ),
                    )
                    .with_subject(mapping.control_name.clone()),
                );
                false
            }
        });

        kept.push(block);
    }

    (kept, diags)
}

//! Form control graph
//!
//! Per-scope collection of named controls with their values, validity,
//! pristine flags, and `showIf` visibility. State machine per control:
//! pristine -> dirty on the first interactive write; unvalidated ->
//! valid | invalid | pending on each validation pass; visible <-> hidden
//! from `showIf`. A hidden control keeps its last value but leaves the
//! aggregate validity computation.
//!
//! Async correlation: every value write bumps the control's generation.
//! An async outcome applies only if its generation still matches, which is
//! how a superseded in-flight request's result gets discarded.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use formflow_core::{
    compile_validators, parse_expression, run_validators, CompiledValidator, CustomValidators,
    Diagnostic, DiagnosticCode, Env, Expr, ExprValue, ExpressionError, FormMapping, Verdict,
};

/// Pseudo-identifiers available to every expression in a scope.
pub const FORM_IS_INVALID: &str = "formIsInvalid";
pub const FORM_IS_PRISTINE: &str = "formIsPristine";

#[derive(Debug, Error, PartialEq)]
#[error("no control named '{0}' in this graph")]
pub struct UnknownControl(pub String);

/// Validation state of one control.
#[derive(Clone, Debug, PartialEq)]
pub enum Validity {
    Unvalidated,
    Valid,
    Invalid { message: String },
    /// Awaiting an async validator response correlated to a generation.
    Pending { generation: u64 },
}

enum ShowIf {
    Always,
    Expr(Expr),
    /// Parse failed at load; fails closed to hidden.
    Broken,
}

/// Result of a value write.
#[derive(Debug, PartialEq)]
pub struct SetOutcome {
    /// Generation to correlate an async validation that is now due.
    pub async_due: Option<u64>,
}

pub struct Control {
    mapping: FormMapping,
    validators: Vec<CompiledValidator>,
    show_if: ShowIf,
    value: Value,
    pristine: bool,
    validity: Validity,
    visible: bool,
    generation: u64,
    /// Generation whose async validation has settled (applied or not due).
    async_settled: Option<u64>,
}

impl Control {
    pub fn name(&self) -> &str {
        &self.mapping.control_name
    }

    pub fn mapping(&self) -> &FormMapping {
        &self.mapping
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn is_pristine(&self) -> bool {
        self.pristine
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.validity, Validity::Pending { .. })
    }

    /// First failing validator message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match &self.validity {
            Validity::Invalid { message } => Some(message),
            _ => None,
        }
    }

    fn counts_as_valid(&self) -> bool {
        matches!(self.validity, Validity::Valid)
    }
}

pub struct FormGraph {
    controls: Vec<Control>,
    index: HashMap<String, usize>,
}

impl FormGraph {
    /// Build a graph from a scope's form mappings. Duplicate control names
    /// are assumed to be already filtered by schema checking; defaults are
    /// applied here, once, before any external patch.
    pub fn build(mappings: &[FormMapping]) -> (Self, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let mut controls = Vec::with_capacity(mappings.len());
        let mut index = HashMap::with_capacity(mappings.len());

        for mapping in mappings {
            let name = mapping.control_name.clone();
            if index.contains_key(&name) {
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::DuplicateControlName,
                        format!("duplicate control name '{name}' within scope"),
                    )
                    .with_subject(name),
                );
                continue;
            }

            let (validators, mut validator_diags) =
                compile_validators(&mapping.control_name, &mapping.validators);
            diags.append(&mut validator_diags);

            let show_if = match &mapping.show_if {
                None => ShowIf::Always,
                Some(source) => match parse_expression(source) {
                    Ok(expr) => ShowIf::Expr(expr),
                    Err(err) => {
                        diags.push(
                            Diagnostic::error(
                                DiagnosticCode::ExpressionSyntax,
                                format!(
                                    "control '{}': showIf failed to parse: {err}",
                                    mapping.control_name
                                ),
                            )
                            .with_subject(mapping.control_name.clone()),
                        );
                        ShowIf::Broken
                    }
                },
            };

            index.insert(mapping.control_name.clone(), controls.len());
            controls.push(Control {
                value: mapping.default_value.clone().unwrap_or(Value::Null),
                mapping: mapping.clone(),
                validators,
                show_if,
                pristine: true,
                validity: Validity::Unvalidated,
                visible: true,
                generation: 0,
                async_settled: None,
            });
        }

        (Self { controls, index }, diags)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.index.get(name).map(|&i| &self.controls[i])
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Snapshot of every control's current value, visible or not.
    pub fn values_snapshot(&self) -> HashMap<String, Value> {
        self.controls
            .iter()
            .map(|c| (c.name().to_string(), c.value.clone()))
            .collect()
    }

    /// The clean value object for submission: visible controls only.
    pub fn visible_values(&self) -> Value {
        let mut map = Map::new();
        for control in &self.controls {
            if control.visible {
                map.insert(control.name().to_string(), control.value.clone());
            }
        }
        Value::Object(map)
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// AND over visible controls' validity. Pending counts as not-valid,
    /// so gating blocks progression while async validation is in flight.
    /// A graph with zero controls is valid.
    pub fn form_is_valid(&self) -> bool {
        self.controls
            .iter()
            .filter(|c| c.visible)
            .all(Control::counts_as_valid)
    }

    pub fn form_is_invalid(&self) -> bool {
        !self.form_is_valid()
    }

    /// AND over all controls' pristine flags; an empty graph is pristine.
    pub fn form_is_pristine(&self) -> bool {
        self.controls.iter().all(|c| c.pristine)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Write a control value. `interactive` writes clear pristine; patch
    /// writes do not. Every write bumps the generation, superseding any
    /// in-flight async validation.
    pub fn set_value(
        &mut self,
        name: &str,
        value: Value,
        interactive: bool,
        custom: &dyn CustomValidators,
    ) -> Result<SetOutcome, UnknownControl> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| UnknownControl(name.to_string()))?;

        self.controls[i].value = value;
        self.controls[i].generation += 1;
        if interactive {
            self.controls[i].pristine = false;
        }
        Ok(self.revalidate_at(i, custom))
    }

    /// Re-run sync validation for every control, e.g. before submission.
    /// Returns the (name, generation) pairs whose async validation is due.
    pub fn validate_all(&mut self, custom: &dyn CustomValidators) -> Vec<(String, u64)> {
        let mut due = Vec::new();
        for i in 0..self.controls.len() {
            let outcome = self.revalidate_at(i, custom);
            if let Some(generation) = outcome.async_due {
                due.push((self.controls[i].name().to_string(), generation));
            }
        }
        due
    }

    fn revalidate_at(&mut self, i: usize, custom: &dyn CustomValidators) -> SetOutcome {
        let snapshot = self.values_snapshot();
        let control = &mut self.controls[i];

        let verdict = run_validators(&control.value, &control.validators, &snapshot, custom);
        match verdict {
            Verdict::Fail { message } => {
                control.validity = Validity::Invalid { message };
                SetOutcome { async_due: None }
            }
            Verdict::Pass => {
                if control.mapping.async_validator.is_none() {
                    control.validity = Validity::Valid;
                    return SetOutcome { async_due: None };
                }
                // Async settled for this exact value: keep its result.
                if control.async_settled == Some(control.generation) {
                    return SetOutcome { async_due: None };
                }
                let generation = control.generation;
                // Already in flight for this generation: one ticket is enough.
                if control.validity == (Validity::Pending { generation }) {
                    return SetOutcome { async_due: None };
                }
                control.validity = Validity::Pending { generation };
                SetOutcome {
                    async_due: Some(generation),
                }
            }
        }
    }

    /// Apply an async validator outcome. Discarded unless the control is
    /// still pending on the same generation. Returns whether it applied.
    pub fn apply_async_outcome(&mut self, name: &str, generation: u64, verdict: Verdict) -> bool {
        let Some(&i) = self.index.get(name) else {
            return false;
        };
        let control = &mut self.controls[i];
        if control.generation != generation
            || control.validity != (Validity::Pending { generation })
        {
            return false;
        }
        control.async_settled = Some(generation);
        control.validity = match verdict {
            Verdict::Pass => Validity::Valid,
            Verdict::Fail { message } => Validity::Invalid { message },
        };
        true
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Re-evaluate every `showIf` in the scope against the current values
    /// and aggregates. Returns the controls whose visibility flipped and
    /// any expression faults (which fail closed to hidden).
    pub fn recompute_visibility(&mut self) -> (Vec<(String, bool)>, Vec<ExpressionError>) {
        let env = self.expression_env();
        let mut changed = Vec::new();
        let mut faults = Vec::new();

        for control in &mut self.controls {
            let visible = match &control.show_if {
                ShowIf::Always => true,
                ShowIf::Broken => false,
                ShowIf::Expr(expr) => match formflow_core::evaluate(expr, &env) {
                    Ok(result) => result,
                    Err(err) => {
                        faults.push(err);
                        false
                    }
                },
            };
            if visible != control.visible {
                control.visible = visible;
                changed.push((control.name().to_string(), visible));
            }
        }
        (changed, faults)
    }

    /// Environment for this scope's expressions: every control value plus
    /// the `formIsInvalid` / `formIsPristine` pseudo-identifiers.
    pub fn expression_env(&self) -> Env {
        let mut env = Env::new();
        for control in &self.controls {
            env.insert_json(control.name(), &control.value);
        }
        env.insert(FORM_IS_INVALID, ExprValue::Bool(self.form_is_invalid()));
        env.insert(FORM_IS_PRISTINE, ExprValue::Bool(self.form_is_pristine()));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_core::{AsyncValidatorSpec, NoCustomValidators, ValidatorSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(name: &str) -> FormMapping {
        FormMapping {
            control_name: name.to_string(),
            selector: format!("#{name}"),
            error_selector: None,
            validators: vec![],
            async_validator: None,
            default_value: None,
            show_if: None,
            mask: None,
        }
    }

    fn required(name: &str) -> FormMapping {
        FormMapping {
            validators: vec![ValidatorSpec::Required {
                message: format!("{name} is required"),
            }],
            ..mapping(name)
        }
    }

    fn async_spec() -> AsyncValidatorSpec {
        AsyncValidatorSpec {
            endpoint: "/check".to_string(),
            method: "POST".to_string(),
            error_key: "taken".to_string(),
            message: "already taken".to_string(),
        }
    }

    #[test]
    fn empty_graph_is_valid_and_pristine() {
        let (graph, diags) = FormGraph::build(&[]);
        assert!(diags.is_empty());
        assert!(graph.form_is_valid());
        assert!(graph.form_is_pristine());
    }

    #[test]
    fn default_value_applied_once_at_creation() {
        let m = FormMapping {
            default_value: Some(json!("Berlin")),
            ..mapping("city")
        };
        let (graph, _) = FormGraph::build(&[m]);
        assert_eq!(graph.control("city").unwrap().value(), &json!("Berlin"));
        assert!(graph.control("city").unwrap().is_pristine());
    }

    #[test]
    fn required_empty_control_makes_form_invalid() {
        let (mut graph, _) = FormGraph::build(&[required("email")]);
        graph.validate_all(&NoCustomValidators);
        assert!(graph.form_is_invalid());

        graph
            .set_value("email", json!("a@x.com"), true, &NoCustomValidators)
            .unwrap();
        assert!(graph.form_is_valid());
        assert!(!graph.form_is_pristine());
    }

    #[test]
    fn patch_write_keeps_pristine_interactive_write_clears_it() {
        let (mut graph, _) = FormGraph::build(&[mapping("city")]);
        graph
            .set_value("city", json!("Oslo"), false, &NoCustomValidators)
            .unwrap();
        assert!(graph.form_is_pristine());
        graph
            .set_value("city", json!("Bergen"), true, &NoCustomValidators)
            .unwrap();
        assert!(!graph.form_is_pristine());
    }

    #[test]
    fn unknown_control_write_is_an_error() {
        let (mut graph, _) = FormGraph::build(&[mapping("city")]);
        let err = graph
            .set_value("ghost", json!(1), true, &NoCustomValidators)
            .unwrap_err();
        assert_eq!(err, UnknownControl("ghost".to_string()));
    }

    #[test]
    fn hidden_control_leaves_aggregate_but_keeps_value() {
        let gated = FormMapping {
            show_if: Some("accountType === 'business'".to_string()),
            ..required("vatId")
        };
        let (mut graph, _) = FormGraph::build(&[mapping("accountType"), gated]);
        graph
            .set_value("accountType", json!("personal"), true, &NoCustomValidators)
            .unwrap();
        graph.validate_all(&NoCustomValidators);
        let (changed, faults) = graph.recompute_visibility();
        assert!(faults.is_empty());
        assert_eq!(changed, vec![("vatId".to_string(), false)]);

        // hidden required control does not count against validity
        assert!(graph.form_is_valid());

        // enter a value while hidden is impossible in the UI, but the last
        // value survives hide/show cycles
        graph
            .set_value("vatId", json!("DE123"), true, &NoCustomValidators)
            .unwrap();
        graph
            .set_value("accountType", json!("business"), true, &NoCustomValidators)
            .unwrap();
        let (changed, _) = graph.recompute_visibility();
        assert_eq!(changed, vec![("vatId".to_string(), true)]);
        assert_eq!(graph.control("vatId").unwrap().value(), &json!("DE123"));
        assert!(graph.form_is_valid());
    }

    #[test]
    fn broken_show_if_fails_closed_to_hidden() {
        let broken = FormMapping {
            show_if: Some("=== nonsense".to_string()),
            ..mapping("extra")
        };
        let (mut graph, diags) = FormGraph::build(&[broken]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::ExpressionSyntax);
        let (changed, _) = graph.recompute_visibility();
        assert_eq!(changed, vec![("extra".to_string(), false)]);
    }

    #[test]
    fn unknown_identifier_hides_and_reports() {
        let gated = FormMapping {
            show_if: Some("missingControl === 'x'".to_string()),
            ..mapping("extra")
        };
        let (mut graph, diags) = FormGraph::build(&[gated]);
        assert!(diags.is_empty());
        let (changed, faults) = graph.recompute_visibility();
        assert_eq!(changed, vec![("extra".to_string(), false)]);
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn async_due_only_after_sync_passes() {
        let m = FormMapping {
            async_validator: Some(async_spec()),
            ..required("email")
        };
        let (mut graph, _) = FormGraph::build(&[m]);

        // empty value: required fails, no async dispatch
        let outcome = graph
            .set_value("email", json!(""), true, &NoCustomValidators)
            .unwrap();
        assert_eq!(outcome.async_due, None);
        assert!(graph.control("email").unwrap().error_message().is_some());

        let outcome = graph
            .set_value("email", json!("a@x.com"), true, &NoCustomValidators)
            .unwrap();
        let generation = outcome.async_due.expect("async should be due");
        assert!(graph.control("email").unwrap().is_pending());
        // pending gates the aggregate
        assert!(graph.form_is_invalid());

        assert!(graph.apply_async_outcome("email", generation, Verdict::Pass));
        assert!(graph.form_is_valid());
    }

    #[test]
    fn superseded_async_outcome_is_discarded() {
        let m = FormMapping {
            async_validator: Some(async_spec()),
            ..mapping("email")
        };
        let (mut graph, _) = FormGraph::build(&[m]);

        let first = graph
            .set_value("email", json!("a@x.com"), true, &NoCustomValidators)
            .unwrap()
            .async_due
            .unwrap();
        let second = graph
            .set_value("email", json!("b@x.com"), true, &NoCustomValidators)
            .unwrap()
            .async_due
            .unwrap();
        assert_ne!(first, second);

        // stale response arrives later; it must not apply
        assert!(!graph.apply_async_outcome(
            "email",
            first,
            Verdict::Fail {
                message: "taken".to_string()
            }
        ));
        assert!(graph.control("email").unwrap().is_pending());

        assert!(graph.apply_async_outcome("email", second, Verdict::Pass));
        assert_eq!(graph.control("email").unwrap().validity(), &Validity::Valid);
    }

    #[test]
    fn in_flight_generation_is_not_due_again() {
        let m = FormMapping {
            async_validator: Some(async_spec()),
            ..mapping("email")
        };
        let (mut graph, _) = FormGraph::build(&[m]);
        let generation = graph
            .set_value("email", json!("a@x.com"), true, &NoCustomValidators)
            .unwrap()
            .async_due
            .unwrap();

        // a full validation pass while the response is outstanding must not
        // request a second dispatch for the same generation
        let due = graph.validate_all(&NoCustomValidators);
        assert!(due.is_empty());
        assert_eq!(
            graph.control("email").unwrap().validity(),
            &Validity::Pending { generation }
        );
    }

    #[test]
    fn settled_async_result_survives_revalidation() {
        let m = FormMapping {
            async_validator: Some(async_spec()),
            ..mapping("email")
        };
        let (mut graph, _) = FormGraph::build(&[m]);
        let generation = graph
            .set_value("email", json!("a@x.com"), true, &NoCustomValidators)
            .unwrap()
            .async_due
            .unwrap();
        graph.apply_async_outcome("email", generation, Verdict::Pass);

        // validate_all must not re-dispatch for an unchanged value
        let due = graph.validate_all(&NoCustomValidators);
        assert!(due.is_empty());
        assert_eq!(graph.control("email").unwrap().validity(), &Validity::Valid);
    }

    #[test]
    fn match_validator_does_not_cascade() {
        let confirm = FormMapping {
            validators: vec![ValidatorSpec::Match {
                other: "password".to_string(),
                message: "passwords differ".to_string(),
            }],
            ..mapping("confirm")
        };
        let (mut graph, _) = FormGraph::build(&[required("password"), confirm]);
        graph.validate_all(&NoCustomValidators);

        graph
            .set_value("password", json!("hunter2"), true, &NoCustomValidators)
            .unwrap();
        // confirm was validated before password changed; only a full pass
        // or its own write refreshes it
        graph
            .set_value("confirm", json!("hunter2"), true, &NoCustomValidators)
            .unwrap();
        assert!(graph.form_is_valid());
    }

    #[test]
    fn visible_values_excludes_hidden_controls() {
        let gated = FormMapping {
            show_if: Some("kind === 'b'".to_string()),
            ..mapping("extra")
        };
        let (mut graph, _) = FormGraph::build(&[mapping("kind"), gated]);
        graph
            .set_value("kind", json!("a"), true, &NoCustomValidators)
            .unwrap();
        graph
            .set_value("extra", json!("kept"), false, &NoCustomValidators)
            .unwrap();
        graph.recompute_visibility();

        assert_eq!(graph.visible_values(), json!({"kind": "a"}));
    }
}

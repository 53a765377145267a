//! Binding resolution
//!
//! Applies `dataBindings` and `tableBindings` to the abstract render port.
//! Application is idempotent: the resolver remembers the last value pushed
//! per (scope, selector) and skips identical re-application, so re-running
//! a binding pass has no observable effect.

use serde_json::{json, Value};
use std::collections::HashMap;

use formflow_core::{DataBinding, Diagnostic, DiagnosticCode, TableBinding};

use crate::context::ContextId;
use crate::ports::RenderPort;

#[derive(Default)]
pub struct BindingResolver {
    applied: HashMap<(ContextId, String), Value>,
}

impl BindingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push static data bindings into the scope's elements. Unresolvable
    /// selectors are reported, not fatal.
    pub fn apply_data_bindings(
        &mut self,
        scope: ContextId,
        bindings: &[DataBinding],
        render: &dyn RenderPort,
    ) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for binding in bindings {
            if self.already_applied(scope, &binding.selector, &binding.value) {
                continue;
            }
            let handles = render.resolve(scope, &binding.selector);
            if handles.is_empty() {
                diags.push(unresolved(&binding.selector));
                continue;
            }
            let text = display_text(&binding.value);
            for handle in handles {
                render.set_display_value(handle, &text);
            }
            self.remember(scope, &binding.selector, binding.value.clone());
        }
        diags
    }

    /// Push table bindings as one structured payload per selector; the host
    /// renders columns/rows/actions from it.
    pub fn apply_table_bindings(
        &mut self,
        scope: ContextId,
        tables: &[TableBinding],
        render: &dyn RenderPort,
    ) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for table in tables {
            let payload = json!({
                "columns": table.columns,
                "rows": table.rows,
                "rowActions": table.row_actions,
            });
            if self.already_applied(scope, &table.selector, &payload) {
                continue;
            }
            let handles = render.resolve(scope, &table.selector);
            if handles.is_empty() {
                diags.push(unresolved(&table.selector));
                continue;
            }
            let text = payload.to_string();
            for handle in handles {
                render.set_display_value(handle, &text);
            }
            self.remember(scope, &table.selector, payload);
        }
        diags
    }

    /// Drop the idempotence cache for a torn-down scope.
    pub fn forget_scope(&mut self, scope: ContextId) {
        self.applied.retain(|(s, _), _| *s != scope);
    }

    fn already_applied(&self, scope: ContextId, selector: &str, value: &Value) -> bool {
        self.applied.get(&(scope, selector.to_string())) == Some(value)
    }

    fn remember(&mut self, scope: ContextId, selector: &str, value: Value) {
        self.applied.insert((scope, selector.to_string()), value);
    }
}

fn unresolved(selector: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::UnresolvedSelector,
        format!("selector '{selector}' resolved to no elements"),
    )
    .with_subject(selector.to_string())
}

/// Text pushed through `set_display_value`: strings raw, scalars formatted,
/// containers as JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Apply a format-only input mask: `#` takes the next digit, `A` the next
/// letter, `*` the next character; other mask characters are literals.
/// Input characters that do not fit the next slot are dropped. The mask
/// never constrains the stored value, only its displayed form.
pub fn apply_mask(mask: &str, text: &str) -> String {
    let mut out = String::with_capacity(mask.len());
    let mut input = text.chars().peekable();

    for slot in mask.chars() {
        let wanted: Option<fn(char) -> bool> = match slot {
            '#' => Some(|c: char| c.is_ascii_digit()),
            'A' => Some(|c: char| c.is_alphabetic()),
            '*' => Some(|_| true),
            _ => None,
        };
        match wanted {
            Some(accept) => {
                // skip input until a character fits this slot
                let mut emitted = false;
                for c in input.by_ref() {
                    if accept(c) {
                        out.push(c);
                        emitted = true;
                        break;
                    }
                }
                if !emitted {
                    return out;
                }
            }
            None => {
                if input.peek().is_none() {
                    return out;
                }
                out.push(slot);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStack;
    use crate::graph::FormGraph;
    use crate::ports::{ElementHandle, InteractionKind};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRender {
        calls: Mutex<Vec<(u64, String)>>,
        missing: Vec<String>,
    }

    impl RenderPort for RecordingRender {
        fn resolve(&self, scope: ContextId, selector: &str) -> Vec<ElementHandle> {
            if self.missing.iter().any(|m| m == selector) {
                return vec![];
            }
            // one deterministic handle per (scope, selector)
            let mut hash = scope.raw().wrapping_mul(31);
            for b in selector.bytes() {
                hash = hash.wrapping_mul(31).wrapping_add(b as u64);
            }
            vec![ElementHandle(hash)]
        }

        fn set_display_value(&self, handle: ElementHandle, value: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((handle.0, value.to_string()));
        }

        fn set_visibility(&self, _handle: ElementHandle, _visible: bool) {}
        fn set_enabled(&self, _handle: ElementHandle, _enabled: bool) {}
        fn wire_interaction(
            &self,
            _handle: ElementHandle,
            _kind: InteractionKind,
            _scope: ContextId,
            _tag: &str,
        ) {
        }
    }

    fn scope() -> ContextId {
        ContextStack::new().create(None, vec![], FormGraph::build(&[]).0)
    }

    #[test]
    fn reapplying_same_binding_is_a_no_op() {
        let render = RecordingRender::default();
        let mut resolver = BindingResolver::new();
        let scope = scope();
        let bindings = vec![DataBinding {
            selector: "#title".to_string(),
            value: json!("Welcome"),
        }];

        let diags = resolver.apply_data_bindings(scope, &bindings, &render);
        assert!(diags.is_empty());
        assert_eq!(render.calls.lock().unwrap().len(), 1);

        resolver.apply_data_bindings(scope, &bindings, &render);
        assert_eq!(render.calls.lock().unwrap().len(), 1);

        // a changed value applies again
        let changed = vec![DataBinding {
            selector: "#title".to_string(),
            value: json!("Hello"),
        }];
        resolver.apply_data_bindings(scope, &changed, &render);
        assert_eq!(render.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn unresolved_selector_is_reported_not_fatal() {
        let render = RecordingRender {
            missing: vec!["#ghost".to_string()],
            ..Default::default()
        };
        let mut resolver = BindingResolver::new();
        let scope = scope();
        let bindings = vec![
            DataBinding {
                selector: "#ghost".to_string(),
                value: json!(1),
            },
            DataBinding {
                selector: "#real".to_string(),
                value: json!(2),
            },
        ];
        let diags = resolver.apply_data_bindings(scope, &bindings, &render);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnresolvedSelector);
        assert_eq!(render.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn table_binding_serializes_columns_rows_actions() {
        let render = RecordingRender::default();
        let mut resolver = BindingResolver::new();
        let scope = scope();
        let tables = vec![TableBinding {
            selector: "#orders".to_string(),
            columns: vec![formflow_core::ColumnDef {
                key: "id".to_string(),
                header: "Order".to_string(),
            }],
            rows: vec![json!({"id": 1})],
            row_actions: vec![formflow_core::RowAction {
                label: "Open".to_string(),
                action: "openOrder".to_string(),
                style_class: None,
            }],
        }];
        resolver.apply_table_bindings(scope, &tables, &render);

        let calls = render.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let payload: Value = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(payload["columns"][0]["key"], "id");
        assert_eq!(payload["rows"][0]["id"], 1);
        assert_eq!(payload["rowActions"][0]["action"], "openOrder");
    }

    #[test]
    fn display_text_formats() {
        assert_eq!(display_text(&json!("x")), "x");
        assert_eq!(display_text(&json!(null)), "");
        assert_eq!(display_text(&json!(3.5)), "3.5");
        assert_eq!(display_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn masks_format_without_constraining() {
        assert_eq!(apply_mask("###-##", "12345"), "123-45");
        assert_eq!(apply_mask("###-##", "12a345"), "123-45");
        assert_eq!(apply_mask("###", "12"), "12");
        assert_eq!(apply_mask("AA-##", "ab12"), "ab-12");
        assert_eq!(apply_mask("**", "!?"), "!?");
        assert_eq!(apply_mask("###", ""), "");
    }
}

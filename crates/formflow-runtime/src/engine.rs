//! Engine façade
//!
//! Single entry surface over the context stack, the form graphs, the
//! binding resolver, and the event queue. All mutation funnels through the
//! entry points here; after each one the affected scope's visibility,
//! error displays, and button states are refreshed through the render
//! port, and observable outcomes land on the event queue for the host to
//! drain.
//!
//! The engine owns no executor. Async validation surfaces as tickets the
//! host takes and drives through [`Engine::run_async_validation`]; a
//! superseded ticket's result is discarded by generation check, never by
//! aborting the underlying call.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use formflow_core::{
    check_schema, ContentBlock, CustomValidators, DataBinding, Diagnostic, DiagnosticCode,
    DisableWhen, TableBinding, Verdict, SUBMIT_ACTION,
};

use crate::binding::{apply_mask, display_text, BindingResolver};
use crate::context::{ContextId, ContextStack};
use crate::events::{EngineEvent, EventQueue};
use crate::graph::FormGraph;
use crate::patch::deep_patch_values;
use crate::ports::{AsyncValidatorTransport, InteractionKind, RenderPort};

/// Message shown for a control whose async validation could not complete.
const VALIDATION_UNAVAILABLE: &str = "validation unavailable";

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("unknown context {0}")]
    UnknownContext(ContextId),
    #[error("unknown control '{control}' in {context}")]
    UnknownControl {
        context: ContextId,
        control: String,
    },
    #[error("no active context; load a schema first")]
    NoActiveContext,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Ceiling on one async validator round-trip, timeout inclusive of the
    /// transport's own retries.
    pub async_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            async_timeout: Duration::from_secs(5),
        }
    }
}

/// One unit of async validation work the host must drive. Carries the
/// generation that correlates the eventual outcome back to the value that
/// requested it.
#[derive(Clone, Debug)]
pub struct AsyncTicket {
    pub context_id: ContextId,
    pub control: String,
    pub generation: u64,
    pub endpoint: String,
    pub method: String,
    pub payload: Value,
    error_key: String,
    message: String,
}

pub struct Engine {
    render: Arc<dyn RenderPort>,
    custom: Arc<dyn CustomValidators>,
    config: EngineConfig,
    contexts: ContextStack,
    bindings: BindingResolver,
    events: EventQueue,
    async_work: Vec<AsyncTicket>,
}

impl Engine {
    pub fn new(render: Arc<dyn RenderPort>, custom: Arc<dyn CustomValidators>) -> Self {
        Self::with_config(render, custom, EngineConfig::default())
    }

    pub fn with_config(
        render: Arc<dyn RenderPort>,
        custom: Arc<dyn CustomValidators>,
        config: EngineConfig,
    ) -> Self {
        Self {
            render,
            custom,
            config,
            contexts: ContextStack::new(),
            bindings: BindingResolver::new(),
            events: EventQueue::new(),
            async_work: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load a schema as the new root context. Any previously live contexts
    /// are torn down first; loading never partially applies, because the
    /// new scope is built in full before the old ones are destroyed.
    pub fn load_root(&mut self, blocks: Vec<ContentBlock>) -> ContextId {
        let (kept, graph, diags) = self.build_scope(blocks);

        for id in self.contexts.ids() {
            let is_root = self
                .contexts
                .get(id)
                .map(|c| c.parent.is_none())
                .unwrap_or(false);
            if is_root {
                for destroyed in self.contexts.destroy(id) {
                    self.bindings.forget_scope(destroyed);
                }
            }
        }

        let ctx = self.contexts.create(None, kept, graph);
        debug!(%ctx, "root context loaded");
        self.report_all(Some(ctx), diags);
        self.initialize_scope(ctx);
        ctx
    }

    /// Replace a live context's schema in place, keeping its id. The new
    /// scope is built before the old graph is dropped, so a schema that
    /// fails to produce a graph never leaves the context half-replaced.
    /// Descendant modals of the replaced context are destroyed.
    pub fn replace_schema(
        &mut self,
        ctx: ContextId,
        blocks: Vec<ContentBlock>,
    ) -> Result<(), EngineError> {
        if !self.contexts.contains(ctx) {
            return Err(EngineError::UnknownContext(ctx));
        }

        let (kept, graph, diags) = self.build_scope(blocks);

        for destroyed in self.contexts.destroy_descendants(ctx) {
            self.bindings.forget_scope(destroyed);
        }
        self.bindings.forget_scope(ctx);
        if let Some(context) = self.contexts.get_mut(ctx) {
            context.blocks = kept;
            context.graph = graph;
        }

        debug!(%ctx, "schema replaced in place");
        self.report_all(Some(ctx), diags);
        self.initialize_scope(ctx);
        Ok(())
    }

    /// Open a modal context on top of a live parent. The modal gets its own
    /// selector namespace and form graph; same-named controls in parent and
    /// modal never collide.
    pub fn open_modal(
        &mut self,
        parent: ContextId,
        blocks: Vec<ContentBlock>,
    ) -> Result<ContextId, EngineError> {
        if !self.contexts.contains(parent) {
            return Err(EngineError::UnknownContext(parent));
        }
        let (kept, graph, diags) = self.build_scope(blocks);
        let ctx = self.contexts.create(Some(parent), kept, graph);
        debug!(%ctx, %parent, "modal context opened");
        self.report_all(Some(ctx), diags);
        self.initialize_scope(ctx);
        Ok(ctx)
    }

    /// Destroy a context and its descendants, deepest-first.
    pub fn close_context(&mut self, ctx: ContextId) -> Result<(), EngineError> {
        if !self.contexts.contains(ctx) {
            return Err(EngineError::UnknownContext(ctx));
        }
        for destroyed in self.contexts.destroy(ctx) {
            self.bindings.forget_scope(destroyed);
            debug!(%destroyed, "context destroyed");
        }
        Ok(())
    }

    pub fn active_context(&self) -> Option<ContextId> {
        self.contexts.active()
    }

    pub fn context_depth(&self, ctx: ContextId) -> usize {
        self.contexts.depth(ctx)
    }

    /// Read-only view of a context's form graph.
    pub fn graph(&self, ctx: ContextId) -> Option<&FormGraph> {
        self.contexts.get(ctx).map(|c| &c.graph)
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Interactive value change from the UI. Clears the control's pristine
    /// flag, revalidates it, and refreshes the scope.
    pub fn set_value(
        &mut self,
        ctx: ContextId,
        control: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let custom = Arc::clone(&self.custom);
        let context = self
            .contexts
            .get_mut(ctx)
            .ok_or(EngineError::UnknownContext(ctx))?;
        let outcome = context
            .graph
            .set_value(control, value, true, custom.as_ref())
            .map_err(|e| EngineError::UnknownControl {
                context: ctx,
                control: e.0,
            })?;

        if let Some(generation) = outcome.async_due {
            self.push_async_ticket(ctx, control, generation);
        }
        self.refresh_scope(ctx);
        Ok(())
    }

    /// Deep-patch an external data object into the active context.
    pub fn inject_data(&mut self, data: &Value) -> Result<Vec<String>, EngineError> {
        let ctx = self.contexts.active().ok_or(EngineError::NoActiveContext)?;
        self.inject_data_into(ctx, data)
    }

    /// Deep-patch an external data object into one context: every control
    /// name found anywhere in the object is assigned its first-occurrence
    /// value. Patch writes keep pristine flags intact. Returns the patched
    /// control names in assignment order.
    pub fn inject_data_into(
        &mut self,
        ctx: ContextId,
        data: &Value,
    ) -> Result<Vec<String>, EngineError> {
        let custom = Arc::clone(&self.custom);
        let context = self
            .contexts
            .get_mut(ctx)
            .ok_or(EngineError::UnknownContext(ctx))?;

        let names: HashSet<String> = context
            .graph
            .controls()
            .map(|c| c.name().to_string())
            .collect();
        let patches = deep_patch_values(data, &names);

        let mut patched = Vec::with_capacity(patches.len());
        let mut due = Vec::new();
        for (name, value) in patches {
            // names come from the graph itself, the write cannot miss
            if let Ok(outcome) = context.graph.set_value(&name, value, false, custom.as_ref()) {
                if let Some(generation) = outcome.async_due {
                    due.push((name.clone(), generation));
                }
                patched.push(name);
            }
        }

        for (name, generation) in due {
            self.push_async_ticket(ctx, &name, generation);
        }
        self.reflect_values(ctx, &patched);
        self.refresh_scope(ctx);
        debug!(%ctx, count = patched.len(), "data injected");
        Ok(patched)
    }

    /// Route an action tag fired in a context. `submit` runs submission;
    /// any other tag is surfaced to the host, as `triggerAction` when it
    /// originated in a modal and `actionTriggered` at the root.
    pub fn handle_action(
        &mut self,
        ctx: ContextId,
        action: &str,
        data: Value,
    ) -> Result<(), EngineError> {
        let is_modal = self
            .contexts
            .get(ctx)
            .ok_or(EngineError::UnknownContext(ctx))?
            .parent
            .is_some();

        if action == SUBMIT_ACTION {
            self.submit(ctx)?;
            return Ok(());
        }

        let event = if is_modal {
            EngineEvent::TriggerAction {
                action: action.to_string(),
                data,
                context_id: ctx,
            }
        } else {
            EngineEvent::ActionTriggered {
                action: action.to_string(),
                data,
                context_id: ctx,
            }
        };
        self.events.push(event);
        Ok(())
    }

    /// Validate the whole scope and emit `formSubmitted` only if every
    /// visible control is valid. An invalid or still-pending scope
    /// suppresses submission and refreshes its error displays instead.
    /// Returns whether submission went through.
    pub fn submit(&mut self, ctx: ContextId) -> Result<bool, EngineError> {
        let custom = Arc::clone(&self.custom);
        let context = self
            .contexts
            .get_mut(ctx)
            .ok_or(EngineError::UnknownContext(ctx))?;
        let due = context.graph.validate_all(custom.as_ref());
        for (name, generation) in due {
            self.push_async_ticket(ctx, &name, generation);
        }
        self.refresh_scope(ctx);

        let Some(context) = self.contexts.get(ctx) else {
            return Err(EngineError::UnknownContext(ctx));
        };
        if context.graph.form_is_valid() {
            let values = context.graph.visible_values();
            self.events.push(EngineEvent::FormSubmitted {
                context_id: ctx,
                values,
            });
            debug!(%ctx, "form submitted");
            Ok(true)
        } else {
            debug!(%ctx, "submission suppressed: form not valid");
            Ok(false)
        }
    }

    // ------------------------------------------------------------------
    // Async validation
    // ------------------------------------------------------------------

    /// Take the pending async validation tickets. The host drives each one
    /// through [`Engine::run_async_validation`].
    pub fn take_async_work(&mut self) -> Vec<AsyncTicket> {
        std::mem::take(&mut self.async_work)
    }

    /// Drive one async validation ticket through the transport, bounded by
    /// the configured timeout. Transport failure and timeout both resolve
    /// the control to invalid with a generic message rather than leaving it
    /// pending forever. A stale outcome (the value changed while the call
    /// was in flight) is discarded.
    pub async fn run_async_validation(
        &mut self,
        ticket: AsyncTicket,
        transport: &dyn AsyncValidatorTransport,
    ) {
        let call = transport.send(&ticket.endpoint, &ticket.method, ticket.payload.clone());
        let verdict = match tokio::time::timeout(self.config.async_timeout, call).await {
            Ok(Ok(response)) => {
                if truthy(response.get(&ticket.error_key)) {
                    Verdict::Fail {
                        message: ticket.message.clone(),
                    }
                } else {
                    Verdict::Pass
                }
            }
            Ok(Err(err)) => {
                self.report(
                    Some(ticket.context_id),
                    Diagnostic::warning(
                        DiagnosticCode::AsyncTransportFailure,
                        format!("async validator '{}' failed: {err}", ticket.endpoint),
                    )
                    .with_subject(ticket.control.clone()),
                );
                Verdict::Fail {
                    message: VALIDATION_UNAVAILABLE.to_string(),
                }
            }
            Err(_) => {
                self.report(
                    Some(ticket.context_id),
                    Diagnostic::warning(
                        DiagnosticCode::AsyncTransportFailure,
                        format!("async validator '{}' timed out", ticket.endpoint),
                    )
                    .with_subject(ticket.control.clone()),
                );
                Verdict::Fail {
                    message: VALIDATION_UNAVAILABLE.to_string(),
                }
            }
        };

        let Some(context) = self.contexts.get_mut(ticket.context_id) else {
            return;
        };
        let applied =
            context
                .graph
                .apply_async_outcome(&ticket.control, ticket.generation, verdict);
        if applied {
            self.refresh_scope(ticket.context_id);
        } else {
            debug!(
                control = %ticket.control,
                generation = ticket.generation,
                "superseded async outcome discarded"
            );
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn build_scope(
        &self,
        blocks: Vec<ContentBlock>,
    ) -> (Vec<ContentBlock>, FormGraph, Vec<Diagnostic>) {
        let (kept, mut diags) = check_schema(blocks);
        let mappings: Vec<_> = kept
            .iter()
            .flat_map(|b| b.form_mappings.iter().cloned())
            .collect();
        let (graph, mut graph_diags) = FormGraph::build(&mappings);
        diags.append(&mut graph_diags);
        (kept, graph, diags)
    }

    /// Wire a freshly built scope: bindings, interaction routing, initial
    /// display reflection, initial validation, and the `ready` event.
    fn initialize_scope(&mut self, ctx: ContextId) {
        let Some(context) = self.contexts.get(ctx) else {
            return;
        };
        let data: Vec<DataBinding> = context
            .blocks
            .iter()
            .flat_map(|b| b.data_bindings.iter().cloned())
            .collect();
        let tables: Vec<TableBinding> = context
            .blocks
            .iter()
            .flat_map(|b| b.table_bindings.iter().cloned())
            .collect();
        let control_wires: Vec<(String, String)> = context
            .graph
            .controls()
            .map(|c| (c.mapping().selector.clone(), c.name().to_string()))
            .collect();
        let button_wires: Vec<(String, String)> = context
            .blocks
            .iter()
            .flat_map(|b| b.button_configs.iter())
            .map(|b| (b.selector.clone(), b.action.clone()))
            .collect();
        let control_names: Vec<String> = context
            .graph
            .controls()
            .map(|c| c.name().to_string())
            .collect();

        let mut diags = self.bindings.apply_data_bindings(ctx, &data, self.render.as_ref());
        diags.extend(self.bindings.apply_table_bindings(ctx, &tables, self.render.as_ref()));
        self.report_all(Some(ctx), diags);

        for (selector, name) in control_wires {
            for handle in self.render.resolve(ctx, &selector) {
                self.render
                    .wire_interaction(handle, InteractionKind::ValueChange, ctx, &name);
            }
        }
        for (selector, action) in button_wires {
            for handle in self.render.resolve(ctx, &selector) {
                self.render
                    .wire_interaction(handle, InteractionKind::Click, ctx, &action);
            }
        }

        self.reflect_values(ctx, &control_names);

        let custom = Arc::clone(&self.custom);
        let due = match self.contexts.get_mut(ctx) {
            Some(context) => context.graph.validate_all(custom.as_ref()),
            None => Vec::new(),
        };
        for (name, generation) in due {
            self.push_async_ticket(ctx, &name, generation);
        }

        self.refresh_scope(ctx);
        self.events.push(EngineEvent::Ready { context_id: ctx });
    }

    fn push_async_ticket(&mut self, ctx: ContextId, control: &str, generation: u64) {
        let Some(context) = self.contexts.get(ctx) else {
            return;
        };
        let Some(found) = context.graph.control(control) else {
            return;
        };
        let Some(spec) = &found.mapping().async_validator else {
            return;
        };
        self.async_work.push(AsyncTicket {
            context_id: ctx,
            control: control.to_string(),
            generation,
            endpoint: spec.endpoint.clone(),
            method: spec.method.clone(),
            payload: json!({ "control": control, "value": found.value() }),
            error_key: spec.error_key.clone(),
            message: spec.message.clone(),
        });
    }

    /// Push current values (masked where a mask is configured) into their
    /// elements. Used after load and patch; interactive edits are already
    /// on screen, so they are not re-reflected.
    fn reflect_values(&self, ctx: ContextId, names: &[String]) {
        let Some(context) = self.contexts.get(ctx) else {
            return;
        };
        for name in names {
            let Some(control) = context.graph.control(name) else {
                continue;
            };
            let mut text = display_text(control.value());
            if let Some(mask) = &control.mapping().mask {
                text = apply_mask(mask, &text);
            }
            for handle in self.render.resolve(ctx, &control.mapping().selector) {
                self.render.set_display_value(handle, &text);
            }
        }
    }

    /// Recompute visibility, then push visibility flips, error displays,
    /// and button enabled-states through the render port.
    fn refresh_scope(&mut self, ctx: ContextId) {
        let (changed, faults) = match self.contexts.get_mut(ctx) {
            Some(context) => context.graph.recompute_visibility(),
            None => return,
        };
        for fault in faults {
            self.report(
                Some(ctx),
                Diagnostic::warning(DiagnosticCode::UnknownIdentifier, fault.to_string()),
            );
        }

        let Some(context) = self.contexts.get(ctx) else {
            return;
        };

        for (name, visible) in &changed {
            if let Some(control) = context.graph.control(name) {
                for handle in self.render.resolve(ctx, &control.mapping().selector) {
                    self.render.set_visibility(handle, *visible);
                }
            }
        }

        for control in context.graph.controls() {
            let Some(error_selector) = &control.mapping().error_selector else {
                continue;
            };
            let message = if control.is_visible() {
                control.error_message()
            } else {
                None
            };
            for handle in self.render.resolve(ctx, error_selector) {
                match message {
                    Some(text) => {
                        self.render.set_display_value(handle, text);
                        self.render.set_visibility(handle, true);
                    }
                    None => {
                        self.render.set_display_value(handle, "");
                        self.render.set_visibility(handle, false);
                    }
                }
            }
        }

        let invalid = context.graph.form_is_invalid();
        let pristine = context.graph.form_is_pristine();
        for block in &context.blocks {
            for button in &block.button_configs {
                let disabled = match button.disable_when {
                    Some(DisableWhen::FormIsInvalid) => invalid,
                    Some(DisableWhen::FormIsPristine) => pristine,
                    Some(DisableWhen::FormIsInvalidOrPristine) => invalid || pristine,
                    None => false,
                };
                for handle in self.render.resolve(ctx, &button.selector) {
                    self.render.set_enabled(handle, !disabled);
                }
            }
        }
    }

    fn report(&mut self, ctx: Option<ContextId>, diag: Diagnostic) {
        warn!(code = ?diag.code, subject = ?diag.subject, "{}", diag.message);
        self.events.push(EngineEvent::ComponentError {
            message: diag.message,
            context_id: ctx,
        });
    }

    fn report_all(&mut self, ctx: Option<ContextId>, diags: Vec<Diagnostic>) {
        for diag in diags {
            self.report(ctx, diag);
        }
    }
}

/// JSON truthiness for async error keys: absent, `null`, `false`, `0`, and
/// `""` are falsy, everything else truthy.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

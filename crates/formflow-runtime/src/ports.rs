//! Capability ports the host implements
//!
//! The engine never assumes a rendering substrate. It resolves selectors to
//! opaque element handles within a context's scope, pushes display values
//! and visibility through the port, and asks the host to route element
//! interactions back into its entry points. Async validator calls go
//! through a transport port the host backs with whatever I/O it has.

use async_trait::async_trait;
use serde_json::Value;

use formflow_core::TransportError;

use crate::context::ContextId;

/// Opaque handle to one addressable UI element, minted by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    Click,
    ValueChange,
}

/// Abstract rendering capability. Selector resolution is scoped: the same
/// selector string in two contexts resolves within each context's own
/// rendered subtree and never crosses over.
pub trait RenderPort: Send + Sync {
    fn resolve(&self, scope: ContextId, selector: &str) -> Vec<ElementHandle>;
    fn set_display_value(&self, handle: ElementHandle, value: &str);
    fn set_visibility(&self, handle: ElementHandle, visible: bool);
    fn set_enabled(&self, handle: ElementHandle, enabled: bool);
    /// Ask the host to forward this element's interactions of `kind` back
    /// into the engine, tagged with the owning scope and the given tag
    /// (a control name for value changes, an action tag for clicks).
    fn wire_interaction(
        &self,
        handle: ElementHandle,
        kind: InteractionKind,
        scope: ContextId,
        tag: &str,
    );
}

/// Transport for async validator calls. Cancellation is by supersession:
/// the engine discards stale responses, it does not abort the underlying
/// call.
#[async_trait]
pub trait AsyncValidatorTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        method: &str,
        payload: Value,
    ) -> Result<Value, TransportError>;
}

//! Engine events — the observable output of the engine
//!
//! Every externally visible outcome is appended to an internal queue the
//! host drains after driving an entry point. Events are serializable so a
//! host can forward them across a process or component boundary unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::context::ContextId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Engine initialized (or re-initialized) a context.
    #[serde(rename_all = "camelCase")]
    Ready { context_id: ContextId },

    /// A non-submit action fired in a root context.
    #[serde(rename_all = "camelCase")]
    ActionTriggered {
        action: String,
        data: Value,
        context_id: ContextId,
    },

    /// A modal-originated action awaiting a host decision.
    #[serde(rename_all = "camelCase")]
    TriggerAction {
        action: String,
        data: Value,
        context_id: ContextId,
    },

    /// Emitted only when the submitting context's graph is fully valid;
    /// `values` is the clean validated value object.
    #[serde(rename_all = "camelCase")]
    FormSubmitted {
        context_id: ContextId,
        values: Value,
    },

    /// Recoverable fault diagnostic.
    #[serde(rename_all = "camelCase")]
    ComponentError {
        message: String,
        context_id: Option<ContextId>,
    },
}

/// FIFO queue of emitted events.
#[derive(Default)]
pub struct EventQueue {
    queue: VecDeque<EngineEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EngineEvent) {
        self.queue.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

//! Shared test doubles: a recording render port and scripted transports.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use formflow_core::{parse_schema, ContentBlock, TransportError};
use formflow_runtime::{AsyncValidatorTransport, ContextId, ElementHandle, InteractionKind, RenderPort};

/// Deterministic handle for a (scope, selector) pair, shared between the
/// mock's resolver and test assertions.
pub fn handle_of(scope: ContextId, selector: &str) -> ElementHandle {
    let mut hash = scope.raw().wrapping_mul(1099511628211);
    for b in selector.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(b as u64);
    }
    ElementHandle(hash)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderCall {
    Display {
        handle: ElementHandle,
        value: String,
    },
    Visibility {
        handle: ElementHandle,
        visible: bool,
    },
    Enabled {
        handle: ElementHandle,
        enabled: bool,
    },
    Wire {
        handle: ElementHandle,
        kind: InteractionKind,
        scope: ContextId,
        tag: String,
    },
}

/// Render port that resolves every selector (except listed missing ones)
/// to one deterministic handle and records every call.
#[derive(Default)]
pub struct RecordingRender {
    pub calls: Mutex<Vec<RenderCall>>,
    pub missing: Vec<String>,
}

impl RecordingRender {
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_display(&self, handle: ElementHandle) -> Option<String> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                RenderCall::Display { handle: h, value } if h == handle => Some(value),
                _ => None,
            })
    }

    pub fn last_visibility(&self, handle: ElementHandle) -> Option<bool> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                RenderCall::Visibility { handle: h, visible } if h == handle => Some(visible),
                _ => None,
            })
    }

    pub fn last_enabled(&self, handle: ElementHandle) -> Option<bool> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                RenderCall::Enabled { handle: h, enabled } if h == handle => Some(enabled),
                _ => None,
            })
    }

    pub fn wires(&self) -> Vec<(ContextId, InteractionKind, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::Wire {
                    scope, kind, tag, ..
                } => Some((scope, kind, tag)),
                _ => None,
            })
            .collect()
    }
}

impl RenderPort for RecordingRender {
    fn resolve(&self, scope: ContextId, selector: &str) -> Vec<ElementHandle> {
        if self.missing.iter().any(|m| m == selector) {
            return vec![];
        }
        vec![handle_of(scope, selector)]
    }

    fn set_display_value(&self, handle: ElementHandle, value: &str) {
        self.calls.lock().unwrap().push(RenderCall::Display {
            handle,
            value: value.to_string(),
        });
    }

    fn set_visibility(&self, handle: ElementHandle, visible: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(RenderCall::Visibility { handle, visible });
    }

    fn set_enabled(&self, handle: ElementHandle, enabled: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(RenderCall::Enabled { handle, enabled });
    }

    fn wire_interaction(
        &self,
        handle: ElementHandle,
        kind: InteractionKind,
        scope: ContextId,
        tag: &str,
    ) {
        self.calls.lock().unwrap().push(RenderCall::Wire {
            handle,
            kind,
            scope,
            tag: tag.to_string(),
        });
    }
}

/// Transport that always answers with a fixed response body.
pub struct ScriptedTransport {
    pub response: Value,
}

#[async_trait]
impl AsyncValidatorTransport for ScriptedTransport {
    async fn send(
        &self,
        _endpoint: &str,
        _method: &str,
        _payload: Value,
    ) -> Result<Value, TransportError> {
        Ok(self.response.clone())
    }
}

/// Transport whose calls always fail.
pub struct FailingTransport;

#[async_trait]
impl AsyncValidatorTransport for FailingTransport {
    async fn send(
        &self,
        endpoint: &str,
        _method: &str,
        _payload: Value,
    ) -> Result<Value, TransportError> {
        Err(TransportError::Send(format!("connection refused: {endpoint}")))
    }
}

/// Transport that never answers; with a paused tokio clock the engine's
/// timeout fires immediately.
pub struct HangingTransport;

#[async_trait]
impl AsyncValidatorTransport for HangingTransport {
    async fn send(
        &self,
        _endpoint: &str,
        _method: &str,
        _payload: Value,
    ) -> Result<Value, TransportError> {
        tokio::time::sleep(Duration::from_secs(86400)).await;
        Err(TransportError::Timeout)
    }
}

pub fn blocks(json: &str) -> Vec<ContentBlock> {
    parse_schema(json).expect("test schema should parse")
}

/// Two-field sign-in form with a submit button gated on validity.
pub fn login_blocks() -> Vec<ContentBlock> {
    blocks(
        r##"[{
            "contentId": "login",
            "dataBindings": [{"selector": "#title", "value": "Sign in"}],
            "formMappings": [
                {
                    "controlName": "email",
                    "selector": "#email",
                    "errorSelector": "#email-error",
                    "validators": [
                        {"kind": "required", "message": "Email is required"},
                        {"kind": "email", "message": "Not an email address"}
                    ]
                },
                {
                    "controlName": "password",
                    "selector": "#password",
                    "errorSelector": "#password-error",
                    "validators": [
                        {"kind": "required", "message": "Password is required"},
                        {"kind": "minlength", "n": 8, "message": "At least 8 characters"}
                    ]
                }
            ],
            "buttonConfigs": [
                {
                    "selector": "#submit",
                    "action": "submit",
                    "disableWhen": "formIsInvalidOrPristine"
                }
            ]
        }]"##,
    )
}

//! formflow-runtime: the live FormFlow schema execution engine
//!
//! Interprets a loaded Content Block schema into a running form model:
//! - Form control graph with sync + async validation (`graph`)
//! - Deep-patch reconciliation of external data objects (`patch`)
//! - Nested isolated contexts, root + modals (`context`)
//! - Data/table binding application over the render port (`binding`)
//! - Engine façade and event bus (`engine`, `events`)
//! - Capability ports the host implements (`ports`)
//!
//! All mutation enters through the engine's entry points; external callers
//! read snapshots. Async validation is driven by the host through tickets,
//! so the engine itself never owns an executor.

pub mod binding;
pub mod context;
pub mod engine;
pub mod events;
pub mod graph;
pub mod patch;
pub mod ports;

pub use context::{Context, ContextId, ContextStack};
pub use engine::{AsyncTicket, Engine, EngineConfig, EngineError};
pub use events::{EngineEvent, EventQueue};
pub use graph::{Control, FormGraph, SetOutcome, UnknownControl, Validity};
pub use patch::deep_patch_values;
pub use ports::{AsyncValidatorTransport, ElementHandle, InteractionKind, RenderPort};

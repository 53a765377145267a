//! formflow-core: pure logic for the FormFlow schema execution engine
//!
//! This crate contains everything that needs no async runtime and no
//! rendering substrate:
//! - Content Block schema types and load-time validation
//! - Closed conditional-expression grammar (parser + evaluator)
//! - Synchronous validator registry
//! - Diagnostic types for recoverable schema/expression faults
//! - Error taxonomy
//!
//! The live engine (control graph, contexts, bindings, async validation)
//! lives in `formflow-runtime`.

pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod schema;
pub mod validators;

// Re-export commonly used types
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use error::{ExpressionError, SchemaError, TransportError};
pub use expr::{evaluate, evaluate_str, parse_expression, Env, Expr, ExprValue};
pub use schema::{
    check_schema, parse_schema, AsyncValidatorSpec, ButtonConfig, ColumnDef, ContentBlock,
    DataBinding, DisableWhen, FormMapping, RenderMode, RowAction, TableBinding, ValidatorSpec,
    SUBMIT_ACTION,
};
pub use validators::{
    compile_validators, run_validators, CompiledValidator, ControlValues, CustomValidatorFn,
    CustomValidatorTable, CustomValidators, NoCustomValidators, Verdict,
};

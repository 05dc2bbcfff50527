//! Graph model, compilation, and structural validation.

mod builder;
mod types;
mod validator;

pub use builder::{CompileMode, WorkflowGraph};
pub use types::{Edge, GraphDefinition, Node, NodeKind, Position, SubworkflowStandard};
pub use validator::{
    default_rules, validate, ConfigCompletenessRule, CycleDetectionRule, Diagnostic,
    DiagnosticLevel, IsolatedNodeRule, KnownFunctionsRule, StandardBoundsRule,
    StructuralIntegrityRule, ValidationReport, ValidationRule,
};

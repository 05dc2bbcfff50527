//! Pluggable function variants and the registry resolving them.

mod builtin;
mod metadata;
mod registry;
mod traits;

pub use builtin::{register_builtins, PassthroughFunction, VariableSetterFunction};
pub use metadata::{FunctionKind, FunctionMetadata, ParameterSpec, ReturnType};
pub use registry::{FunctionRegistry, RegisteredFunction, RegistryError};
pub use traits::{
    ConditionFunction, FunctionError, NodeFunction, NodeOutcome, RoutingFunction, TriggerFunction,
};

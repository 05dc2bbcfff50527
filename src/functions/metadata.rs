use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four function variants the engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Condition,
    Node,
    Routing,
    Trigger,
}

/// Declared return type of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Bool,
    Value,
    NodeIds,
}

/// A declared parameter of a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: false,
            default,
        }
    }
}

/// Identity and declared shape of a registered function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: Version,
    pub kind: FunctionKind,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    pub returns: ReturnType,
    #[serde(default)]
    pub is_async: bool,
}

impl FunctionMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: FunctionKind) -> Self {
        let returns = match kind {
            FunctionKind::Condition | FunctionKind::Trigger => ReturnType::Bool,
            FunctionKind::Node => ReturnType::Value,
            FunctionKind::Routing => ReturnType::NodeIds,
        };
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: Version::new(0, 1, 0),
            kind,
            parameters: Vec::new(),
            returns,
            is_async: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

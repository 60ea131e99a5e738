//! Translation of tool input schemas into validating invocation contracts.
//!
//! Parameters are plain data ([`ParameterSpec`]) checked by one structural
//! validator, so tools discovered at runtime need no generated types.

use mcp::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ToolSpec;

const NO_DESCRIPTION: &str = "No description";

/// Declared kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// Map a JSON Schema `type` keyword. Unknown or missing keywords map to
    /// `String`; for a type list the first non-`null` entry wins.
    pub fn from_schema_type(ty: Option<&Value>) -> Self {
        let keyword = match ty {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Array(options)) => options
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null"),
            _ => None,
        };

        match keyword {
            Some("integer") => Self::Integer,
            Some("number") => Self::Float,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::String,
        }
    }

    /// Check `value` against this kind, returning the value to forward.
    ///
    /// Whole floats are accepted as integers and normalized (`2.0` → `2`).
    pub fn accept(self, value: &Value) -> Option<Value> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Integer => {
                if value.is_i64() || value.is_u64() {
                    true
                } else {
                    return value
                        .as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64));
                }
            }
        };
        ok.then(|| value.clone())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime type name of a JSON value, for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    /// Always `None` for required parameters, `Some` (possibly `null`) otherwise.
    pub default: Option<Value>,
    pub description: String,
}

/// What to do with arguments the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtraArguments {
    /// Drop them before the call.
    #[default]
    Ignore,
    /// Fail validation.
    Reject,
}

/// A schema too malformed to build a contract from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("tool name is empty")]
    EmptyName,

    #[error("input schema must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("`properties` must be an object")]
    InvalidProperties,

    #[error("`required` must be an array of property names")]
    InvalidRequired,
}

/// A single problem with a candidate argument set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing required argument `{0}`")]
    MissingArgument(String),

    #[error("argument `{field}` must be {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: ParamKind,
        found: &'static str,
    },

    #[error("unexpected argument `{0}`")]
    UnexpectedArgument(String),
}

impl ArgumentError {
    /// The argument this problem is about, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NotAnObject(_) => None,
            Self::MissingArgument(field) | Self::UnexpectedArgument(field) => Some(field),
            Self::TypeMismatch { field, .. } => Some(field),
        }
    }
}

fn describe(errors: &[ArgumentError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every problem found in one argument set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid arguments for `{tool}`: {}", describe(.errors))]
pub struct ValidationError {
    pub tool: String,
    pub errors: Vec<ArgumentError>,
}

/// Validated, callable description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContract {
    name: String,
    input_type: String,
    description: String,
    parameters: Vec<ParameterSpec>,
    schema: Value,
}

impl InvocationContract {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the synthesized input type, derived from the tool name.
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The tool as advertised to the model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema.clone(),
        }
    }

    /// Check `arguments` and return the argument map to forward, in
    /// declaration order with defaults filled in for omitted optionals.
    pub fn validate(
        &self,
        arguments: &Value,
        extra: ExtraArguments,
    ) -> Result<Map<String, Value>, ValidationError> {
        let empty = Map::new();
        let provided = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(self.invalid(vec![ArgumentError::NotAnObject(json_type_name(other))]));
            }
        };

        let mut errors = Vec::new();
        let mut validated = Map::new();

        for param in &self.parameters {
            match provided.get(&param.name) {
                None if param.required => {
                    errors.push(ArgumentError::MissingArgument(param.name.clone()));
                }
                None => {
                    let default = param.default.clone().unwrap_or(Value::Null);
                    validated.insert(param.name.clone(), default);
                }
                Some(Value::Null) if !param.required => {
                    validated.insert(param.name.clone(), Value::Null);
                }
                Some(value) => match param.kind.accept(value) {
                    Some(accepted) => {
                        validated.insert(param.name.clone(), accepted);
                    }
                    None => errors.push(ArgumentError::TypeMismatch {
                        field: param.name.clone(),
                        expected: param.kind,
                        found: json_type_name(value),
                    }),
                },
            }
        }

        if extra == ExtraArguments::Reject {
            errors.extend(
                provided
                    .keys()
                    .filter(|key| self.parameter(key).is_none())
                    .map(|key| ArgumentError::UnexpectedArgument(key.clone())),
            );
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(self.invalid(errors))
        }
    }

    fn invalid(&self, errors: Vec<ArgumentError>) -> ValidationError {
        ValidationError {
            tool: self.name.clone(),
            errors,
        }
    }
}

/// Deterministic input type name for a tool.
pub fn input_type_name(tool_name: &str) -> String {
    format!("{tool_name}_input")
}

/// Build the invocation contract for a discovered tool.
pub fn translate(tool: &Tool) -> Result<InvocationContract, SchemaError> {
    if tool.name.trim().is_empty() {
        return Err(SchemaError::EmptyName);
    }

    let empty = Map::new();
    let schema = match &tool.input_schema {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => return Err(SchemaError::NotAnObject(json_type_name(other))),
    };

    let properties = match schema.get("properties") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(properties)) => properties,
        Some(_) => return Err(SchemaError::InvalidProperties),
    };

    let required: Vec<&str> = match schema.get("required") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| name.as_str().ok_or(SchemaError::InvalidRequired))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(SchemaError::InvalidRequired),
    };

    let parameters = properties
        .iter()
        .map(|(name, definition)| {
            let is_required = required.contains(&name.as_str());
            ParameterSpec {
                name: name.clone(),
                kind: ParamKind::from_schema_type(definition.get("type")),
                required: is_required,
                default: (!is_required)
                    .then(|| definition.get("default").cloned().unwrap_or(Value::Null)),
                description: definition
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        })
        .collect();

    // Providers expect an object schema even for parameterless tools.
    let mut advertised = schema.clone();
    advertised
        .entry("type")
        .or_insert_with(|| Value::String("object".into()));
    advertised
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));

    let description = tool
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(NO_DESCRIPTION)
        .to_string();

    Ok(InvocationContract {
        name: tool.name.clone(),
        input_type: input_type_name(&tool.name),
        description,
        parameters,
        schema: Value::Object(advertised),
    })
}

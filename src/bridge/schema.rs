//! Tool descriptors and argument binding.

use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Named arguments for a tool call.
pub type Arguments = Map<String, Value>;

/// Wire type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// Whether `value` is acceptable for this type.
    ///
    /// Integers accept any JSON number with no fractional part, since planners
    /// routinely emit `5.0` for `5`.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
        }
    }

    /// JSON Schema name of this type.
    pub fn json_schema_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.json_schema_name())
    }
}

/// One entry of a tool's ordered parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParameterSpec {
    /// A required parameter.
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    /// An optional parameter with a default value.
    pub fn optional(name: &str, kind: ParamType, default: Value, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: Some(default),
            description: description.to_string(),
        }
    }
}

/// A named, schema-described operation exposed by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "parameters")]
    pub parameter_schema: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    /// Validate `arguments` against the parameter schema and fill defaults.
    ///
    /// Unknown argument names are rejected so a misspelled optional parameter
    /// does not silently fall back to its default.
    pub fn bind(&self, arguments: &Value) -> Result<Arguments> {
        let supplied = match arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => return Err(self.invalid("arguments must be a JSON object")),
        };

        if let Some(unknown) = supplied
            .keys()
            .find(|key| !self.parameter_schema.iter().any(|p| &p.name == *key))
        {
            return Err(self.invalid(&format!("unexpected argument '{}'", unknown)));
        }

        let mut bound = Map::new();
        for param in &self.parameter_schema {
            match supplied.get(&param.name) {
                Some(Value::Null) | None => {
                    if param.required {
                        return Err(self.invalid(&format!(
                            "missing required argument '{}'",
                            param.name
                        )));
                    }
                    if let Some(default) = &param.default {
                        bound.insert(param.name.clone(), default.clone());
                    }
                }
                Some(value) => {
                    if !param.kind.accepts(value) {
                        return Err(self.invalid(&format!(
                            "argument '{}' must be {}, got {}",
                            param.name, param.kind, value
                        )));
                    }
                    bound.insert(param.name.clone(), value.clone());
                }
            }
        }

        Ok(bound)
    }

    /// Render the parameter list as a JSON Schema object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameter_schema {
            let mut prop = json!({ "type": param.kind.json_schema_name() });
            if !param.description.is_empty() {
                prop["description"] = Value::String(param.description.clone());
            }
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn invalid(&self, reason: &str) -> SpliceError {
        SpliceError::Validation {
            tool: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trim_video() -> ToolDescriptor {
        ToolDescriptor {
            name: "trim_video".to_string(),
            description: "Trim a video".to_string(),
            parameter_schema: vec![
                ParameterSpec::required("input_path", ParamType::String, ""),
                ParameterSpec::required("start_time", ParamType::String, ""),
                ParameterSpec::required("end_time", ParamType::String, ""),
                ParameterSpec::optional(
                    "output_name",
                    ParamType::String,
                    json!("trimmed_video.mp4"),
                    "",
                ),
            ],
        }
    }

    #[test]
    fn test_bind_fills_defaults() {
        let args = json!({"input_path": "a.mp4", "start_time": "5", "end_time": "10"});
        let bound = trim_video().bind(&args).unwrap();
        assert_eq!(bound["output_name"], json!("trimmed_video.mp4"));
        assert_eq!(bound.len(), 4);
    }

    #[test]
    fn test_bind_missing_required() {
        let err = trim_video()
            .bind(&json!({"input_path": "a.mp4", "start_time": "5"}))
            .unwrap_err();
        assert!(err.to_string().contains("missing required argument 'end_time'"));
    }

    #[test]
    fn test_bind_rejects_wrong_type_and_unknown_names() {
        let desc = trim_video();
        let err = desc
            .bind(&json!({"input_path": 3, "start_time": "5", "end_time": "6"}))
            .unwrap_err();
        assert!(err.to_string().contains("must be string"));

        let err = desc
            .bind(&json!({"input_path": "a", "start_time": "5", "end_time": "6", "outptu_name": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("unexpected argument 'outptu_name'"));

        assert!(desc.bind(&json!("a.mp4")).is_err());
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        assert!(ParamType::Integer.accepts(&json!(5)));
        assert!(ParamType::Integer.accepts(&json!(5.0)));
        assert!(!ParamType::Integer.accepts(&json!(5.5)));
        assert!(!ParamType::Integer.accepts(&json!("5")));
    }

    #[test]
    fn test_input_schema() {
        let schema = trim_video().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["input_path", "start_time", "end_time"]));
        assert_eq!(schema["properties"]["output_name"]["default"], "trimmed_video.mp4");
    }
}

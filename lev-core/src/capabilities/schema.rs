//! Input schema parsing and argument validation
//!
//! Capability schemas use a small JSON-Schema-like subset:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "path":  { "type": "string", "description": "Project directory" },
//!     "tail":  { "type": "number", "default": 50 },
//!     "force": { "type": "boolean", "required": true }
//!   },
//!   "required": ["path"],
//!   "additionalProperties": true
//! }
//! ```
//!
//! A schema is parsed once at registration into an [`InputSchema`]; dispatch
//! only ever validates against the parsed form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property name used when an error concerns the schema as a whole
pub const SCHEMA_ROOT: &str = "<schema>";

/// Property name used when an error concerns the argument object as a whole
pub const ARGS_ROOT: &str = "<args>";

/// Value kinds a property can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaKind {
    /// Parse a declared `type` string
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(SchemaKind::String),
            "number" => Some(SchemaKind::Number),
            "boolean" => Some(SchemaKind::Boolean),
            "array" => Some(SchemaKind::Array),
            "object" => Some(SchemaKind::Object),
            _ => None,
        }
    }

    /// Check whether a JSON value has this kind
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaKind::String => value.is_string(),
            SchemaKind::Number => value.is_number(),
            SchemaKind::Boolean => value.is_boolean(),
            SchemaKind::Array => value.is_array(),
            SchemaKind::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describe the kind of a JSON value for error messages
pub fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single declared property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    /// Property name
    pub name: String,

    /// Declared kind; `None` accepts any value
    pub kind: Option<SchemaKind>,

    /// Whether dispatch requires the property
    pub required: bool,

    /// Value filled in when the property is omitted
    pub default: Option<Value>,

    /// Human-readable description
    pub description: Option<String>,
}

/// Problem found while parsing a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Offending property, or [`SCHEMA_ROOT`]
    pub property: String,
    /// What is wrong with it
    pub reason: String,
}

impl SchemaIssue {
    fn new(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

/// Problem found while validating arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentIssue {
    /// Offending property, or [`ARGS_ROOT`]
    pub property: String,
    /// Expected kind or constraint
    pub expected: String,
    /// What was found instead
    pub message: String,
}

/// Parsed, self-consistent input schema
#[derive(Debug, Clone, PartialEq)]
pub struct InputSchema {
    properties: Vec<PropertySchema>,
    allow_additional: bool,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::empty()
    }
}

impl InputSchema {
    /// Schema that accepts any object
    pub fn empty() -> Self {
        Self {
            properties: Vec::new(),
            allow_additional: true,
        }
    }

    /// Parse and check a raw schema value
    ///
    /// `null` is accepted as "no parameters".
    pub fn parse(raw: &Value) -> Result<Self, SchemaIssue> {
        let root = match raw {
            Value::Null => return Ok(Self::empty()),
            Value::Object(map) => map,
            other => {
                return Err(SchemaIssue::new(
                    SCHEMA_ROOT,
                    format!("schema must be an object, found {}", describe_value(other)),
                ));
            }
        };

        if let Some(root_type) = root.get("type")
            && root_type != "object"
        {
            return Err(SchemaIssue::new(
                SCHEMA_ROOT,
                format!("root type must be \"object\", found {}", root_type),
            ));
        }

        let declared = match root.get("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(SchemaIssue::new(
                    SCHEMA_ROOT,
                    format!(
                        "\"properties\" must be an object, found {}",
                        describe_value(other)
                    ),
                ));
            }
        };

        let required_names = parse_required_list(root.get("required"))?;

        let allow_additional = match root.get("additionalProperties") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(allowed)) => *allowed,
            // A nested schema for extras still permits them
            Some(Value::Object(_)) => true,
            Some(other) => {
                return Err(SchemaIssue::new(
                    SCHEMA_ROOT,
                    format!(
                        "\"additionalProperties\" must be a boolean, found {}",
                        describe_value(other)
                    ),
                ));
            }
        };

        for name in &required_names {
            if !declared.contains_key(name) {
                return Err(SchemaIssue::new(
                    name.clone(),
                    "listed as required but has no declared type",
                ));
            }
        }

        let mut properties = Vec::with_capacity(declared.len());
        for (name, spec) in &declared {
            let listed = required_names.iter().any(|r| r == name);
            properties.push(parse_property(name, spec, listed)?);
        }

        Ok(Self {
            properties,
            allow_additional,
        })
    }

    /// Declared properties, ordered by name
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether undeclared properties are accepted
    pub fn allows_additional(&self) -> bool {
        self.allow_additional
    }

    /// Names of required properties
    pub fn required(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Validate arguments and return them with defaults filled in
    ///
    /// `null` arguments are treated as an empty object. Unknown properties are
    /// passed through unless the schema forbids extras.
    pub fn validate(&self, args: Value) -> Result<Value, ArgumentIssue> {
        let mut object = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ArgumentIssue {
                    property: ARGS_ROOT.to_string(),
                    expected: "object".to_string(),
                    message: format!("found {}", describe_value(&other)),
                });
            }
        };

        for property in &self.properties {
            match object.get(&property.name) {
                Some(value) => {
                    if let Some(kind) = property.kind
                        && !kind.matches(value)
                    {
                        return Err(ArgumentIssue {
                            property: property.name.clone(),
                            expected: kind.to_string(),
                            message: format!("found {}", describe_value(value)),
                        });
                    }
                }
                None if property.required => {
                    return Err(ArgumentIssue {
                        property: property.name.clone(),
                        expected: property
                            .kind
                            .map(|k| k.to_string())
                            .unwrap_or_else(|| "any value".to_string()),
                        message: "required property is missing".to_string(),
                    });
                }
                None => {}
            }
        }

        if !self.allow_additional
            && let Some(extra) = object.keys().find(|key| self.property(key).is_none())
        {
            return Err(ArgumentIssue {
                property: extra.clone(),
                expected: "no undeclared properties".to_string(),
                message: "property is not declared in the schema".to_string(),
            });
        }

        for property in &self.properties {
            if let Some(default) = &property.default
                && !object.contains_key(&property.name)
            {
                object.insert(property.name.clone(), default.clone());
            }
        }

        Ok(Value::Object(object))
    }
}

fn parse_required_list(raw: Option<&Value>) -> Result<Vec<String>, SchemaIssue> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(SchemaIssue::new(
                    SCHEMA_ROOT,
                    format!(
                        "\"required\" entries must be strings, found {}",
                        describe_value(other)
                    ),
                )),
            })
            .collect(),
        Some(other) => Err(SchemaIssue::new(
            SCHEMA_ROOT,
            format!(
                "\"required\" must be an array of names, found {}",
                describe_value(other)
            ),
        )),
    }
}

fn parse_property(name: &str, spec: &Value, listed_required: bool) -> Result<PropertySchema, SchemaIssue> {
    let spec = spec.as_object().ok_or_else(|| {
        SchemaIssue::new(
            name,
            format!("property spec must be an object, found {}", describe_value(spec)),
        )
    })?;

    let kind = match spec.get("type") {
        None | Some(Value::Null) => None,
        Some(Value::String(type_name)) => Some(SchemaKind::parse(type_name).ok_or_else(|| {
            SchemaIssue::new(
                name,
                format!(
                    "unsupported type \"{}\" (expected string, number, boolean, array or object)",
                    type_name
                ),
            )
        })?),
        Some(other) => {
            return Err(SchemaIssue::new(
                name,
                format!("\"type\" must be a string, found {}", describe_value(other)),
            ));
        }
    };

    let flagged_required = match spec.get("required") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(SchemaIssue::new(
                name,
                format!("\"required\" must be a boolean, found {}", describe_value(other)),
            ));
        }
    };
    let required = listed_required || flagged_required;

    if required && kind.is_none() {
        return Err(SchemaIssue::new(name, "required property has no type"));
    }

    let default = spec.get("default").cloned();
    if let (Some(kind), Some(value)) = (kind, &default)
        && !kind.matches(value)
    {
        return Err(SchemaIssue::new(
            name,
            format!(
                "default value is {} but the property is declared {}",
                describe_value(value),
                kind
            ),
        ));
    }

    let description = spec
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(PropertySchema {
        name: name.to_string(),
        kind,
        required,
        default,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calc_schema() -> InputSchema {
        InputSchema::parse(&json!({
            "type": "object",
            "properties": {
                "x": { "type": "number" },
                "precision": { "type": "number", "default": 2 },
                "label": { "type": "string" }
            },
            "required": ["x"]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_collects_required_from_both_forms() {
        let schema = InputSchema::parse(&json!({
            "properties": {
                "a": { "type": "string" },
                "b": { "type": "boolean", "required": true },
                "c": {}
            },
            "required": ["a"]
        }))
        .unwrap();

        let mut required = schema.required();
        required.sort();
        assert_eq!(required, vec!["a", "b"]);
        assert_eq!(schema.property("c").unwrap().kind, None);
    }

    #[test]
    fn test_parse_rejects_unsupported_type() {
        let issue = InputSchema::parse(&json!({
            "properties": { "when": { "type": "date" } }
        }))
        .unwrap_err();

        assert_eq!(issue.property, "when");
        assert!(issue.reason.contains("date"));
    }

    #[test]
    fn test_parse_rejects_required_without_type() {
        let issue = InputSchema::parse(&json!({
            "properties": { "target": { "required": true } }
        }))
        .unwrap_err();
        assert_eq!(issue.property, "target");

        let issue = InputSchema::parse(&json!({
            "properties": {},
            "required": ["ghost"]
        }))
        .unwrap_err();
        assert_eq!(issue.property, "ghost");
    }

    #[test]
    fn test_parse_rejects_mismatched_default() {
        let issue = InputSchema::parse(&json!({
            "properties": { "count": { "type": "number", "default": "ten" } }
        }))
        .unwrap_err();

        assert_eq!(issue.property, "count");
    }

    #[test]
    fn test_parse_rejects_non_object_schema() {
        let issue = InputSchema::parse(&json!(["x"])).unwrap_err();
        assert_eq!(issue.property, SCHEMA_ROOT);

        let issue = InputSchema::parse(&json!({ "properties": { "x": "number" } })).unwrap_err();
        assert_eq!(issue.property, "x");
    }

    #[test]
    fn test_null_schema_accepts_anything() {
        let schema = InputSchema::parse(&Value::Null).unwrap();
        let args = schema.validate(json!({ "anything": [1, 2] })).unwrap();
        assert_eq!(args["anything"], json!([1, 2]));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let args = calc_schema().validate(json!({ "x": 4 })).unwrap();
        assert_eq!(args, json!({ "x": 4, "precision": 2 }));
    }

    #[test]
    fn test_validate_keeps_explicit_values_over_defaults() {
        let args = calc_schema()
            .validate(json!({ "x": 4, "precision": 5 }))
            .unwrap();
        assert_eq!(args["precision"], 5);
    }

    #[test]
    fn test_validate_reports_type_mismatch() {
        let issue = calc_schema().validate(json!({ "x": "abc" })).unwrap_err();
        assert_eq!(issue.property, "x");
        assert_eq!(issue.expected, "number");
        assert!(issue.message.contains("string"));
    }

    #[test]
    fn test_validate_checks_present_optional_properties() {
        let issue = calc_schema()
            .validate(json!({ "x": 1, "label": 7 }))
            .unwrap_err();
        assert_eq!(issue.property, "label");
    }

    #[test]
    fn test_validate_reports_missing_required() {
        let issue = calc_schema().validate(json!({})).unwrap_err();
        assert_eq!(issue.property, "x");
        assert!(issue.message.contains("missing"));
    }

    #[test]
    fn test_validate_passes_extras_through() {
        let args = calc_schema()
            .validate(json!({ "x": 1, "trace": "abc" }))
            .unwrap();
        assert_eq!(args["trace"], "abc");
    }

    #[test]
    fn test_validate_rejects_forbidden_extras() {
        let schema = InputSchema::parse(&json!({
            "properties": { "x": { "type": "number" } },
            "additionalProperties": false
        }))
        .unwrap();

        let issue = schema.validate(json!({ "x": 1, "y": 2 })).unwrap_err();
        assert_eq!(issue.property, "y");
    }

    #[test]
    fn test_validate_rejects_non_object_args() {
        let issue = calc_schema().validate(json!("x=1")).unwrap_err();
        assert_eq!(issue.property, ARGS_ROOT);
    }
}

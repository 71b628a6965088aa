//! Schema descriptors for structured output.
//!
//! A [`Schema`] is a declarative tree describing the shape of the value the
//! model must return for each input row. It converts to JSON Schema for the
//! provider request and for local validation, and can be built from a JSON
//! Schema document (including `schemars`-derived ones) via [`Schema::of`].

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Maximum `$ref` nesting followed when importing a JSON Schema.
const MAX_REF_DEPTH: usize = 32;

/// Errors raised while building or converting a schema descriptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The JSON Schema uses a construct with no descriptor equivalent.
    #[error("unsupported schema construct at '{path}': {reason}")]
    Unsupported {
        /// JSON pointer-ish path to the offending node.
        path: String,
        /// What was found there.
        reason: String,
    },

    /// The generated JSON Schema could not be compiled for validation.
    #[error("schema does not compile: {0}")]
    Invalid(String),

    /// An object declares the same field name twice.
    #[error("duplicate field '{name}' at '{path}'")]
    DuplicateField {
        /// Path of the object holding the duplicate.
        path: String,
        /// The repeated name.
        name: String,
    },
}

/// A structured output shape.
///
/// Serialized with an internal `type` tag, so a descriptor file reads like
/// `{"type": "object", "fields": [{"name": "fruit", "type": "string"}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// `true` / `false`.
    Boolean {
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Whole number.
    Integer {
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Floating point number.
    Number {
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Free text.
    String {
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// One of a fixed set of categories.
    Enum {
        /// Allowed category labels.
        values: Vec<String>,
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Homogeneous list.
    Array {
        /// Shape of every element.
        items: Box<Schema>,
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Named fields, in declaration order.
    Object {
        /// The fields of the object.
        fields: Vec<Field>,
        /// Guidance shown to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// A named member of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Property name in the structured result.
    pub name: String,
    /// Shape of the property.
    #[serde(flatten)]
    pub schema: Schema,
    /// Whether the model must produce a non-null value (default: true).
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

impl Field {
    /// Creates a required field.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    /// Marks the field as optional; the model may answer `null`.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl Schema {
    /// Boolean schema.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Boolean { description: None }
    }

    /// Integer schema.
    #[must_use]
    pub const fn integer() -> Self {
        Self::Integer { description: None }
    }

    /// Number schema.
    #[must_use]
    pub const fn number() -> Self {
        Self::Number { description: None }
    }

    /// String schema.
    #[must_use]
    pub const fn string() -> Self {
        Self::String { description: None }
    }

    /// Categorical schema over the given labels.
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    /// Array schema.
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self::Array {
            items: Box::new(items),
            description: None,
        }
    }

    /// Object schema with the given fields.
    #[must_use]
    pub const fn object(fields: Vec<Field>) -> Self {
        Self::Object {
            fields,
            description: None,
        }
    }

    /// Builds a descriptor from a type deriving [`JsonSchema`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] when the derived schema uses
    /// constructs with no descriptor equivalent (untagged unions, maps, ...).
    pub fn of<T: JsonSchema>() -> Result<Self, SchemaError> {
        let root = json!(schemars::schema_for!(T));
        Self::from_json_schema(&root)
    }

    /// Attaches a description to this node.
    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        let slot = match &mut self {
            Self::Boolean { description }
            | Self::Integer { description }
            | Self::Number { description }
            | Self::String { description }
            | Self::Enum { description, .. }
            | Self::Array { description, .. }
            | Self::Object { description, .. } => description,
        };
        *slot = Some(text.into());
        self
    }

    /// Short name of the node kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Boolean { .. } => "boolean",
            Self::Integer { .. } => "integer",
            Self::Number { .. } => "number",
            Self::String { .. } => "string",
            Self::Enum { .. } => "enum",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }

    /// The fields of an object schema, or `None` for any other kind.
    #[must_use]
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Self::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Checks that no object, at any depth, declares a field name twice.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] for the first repeat found.
    pub fn check(&self) -> Result<(), SchemaError> {
        self.check_at("#")
    }

    fn check_at(&self, path: &str) -> Result<(), SchemaError> {
        match self {
            Self::Array { items, .. } => items.check_at(&format!("{path}/items")),
            Self::Object { fields, .. } => {
                let mut seen = HashSet::with_capacity(fields.len());
                for field in fields {
                    if !seen.insert(field.name.as_str()) {
                        return Err(SchemaError::DuplicateField {
                            path: path.to_string(),
                            name: field.name.clone(),
                        });
                    }
                    field.schema.check_at(&format!("{path}/{}", field.name))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> Option<&str> {
        match self {
            Self::Boolean { description }
            | Self::Integer { description }
            | Self::Number { description }
            | Self::String { description }
            | Self::Enum { description, .. }
            | Self::Array { description, .. }
            | Self::Object { description, .. } => description.as_deref(),
        }
    }

    /// Renders the descriptor as a strict JSON Schema.
    ///
    /// Objects list every property as required and forbid additional
    /// properties; optional fields become nullable instead. This is the
    /// form accepted by OpenAI-style `json_schema` response formats.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut out = match self {
            Self::Boolean { .. } => json!({"type": "boolean"}),
            Self::Integer { .. } => json!({"type": "integer"}),
            Self::Number { .. } => json!({"type": "number"}),
            Self::String { .. } => json!({"type": "string"}),
            Self::Enum { values, .. } => json!({"type": "string", "enum": values}),
            Self::Array { items, .. } => json!({"type": "array", "items": items.to_json_schema()}),
            Self::Object { fields, .. } => {
                let mut properties = Map::new();
                for field in fields {
                    let mut property = field.schema.to_json_schema();
                    if !field.required {
                        make_nullable(&mut property);
                    }
                    properties.insert(field.name.clone(), property);
                }
                let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                })
            }
        };

        if let (Some(text), Some(obj)) = (self.description(), out.as_object_mut()) {
            obj.insert("description".to_string(), Value::String(text.to_string()));
        }
        out
    }

    /// Imports a JSON Schema document.
    ///
    /// Supports the scalar types, string `enum`s, arrays, objects, local
    /// `$ref`s into `$defs`/`definitions`, and nullable unions
    /// (`"type": ["string", "null"]` or `anyOf` with a `null` branch), which
    /// mark the enclosing field optional.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] for anything else.
    pub fn from_json_schema(root: &Value) -> Result<Self, SchemaError> {
        Importer { root }.import(root, "#", 0).map(|(schema, _)| schema)
    }
}

/// Adds `null` to the allowed types of a rendered node.
fn make_nullable(node: &mut Value) {
    let Some(obj) = node.as_object_mut() else {
        return;
    };
    if let Some(Value::String(ty)) = obj.get("type").cloned() {
        obj.insert("type".to_string(), json!([ty, "null"]));
    }
    if let Some(Value::Array(values)) = obj.get_mut("enum") {
        values.push(Value::Null);
    }
}

struct Importer<'a> {
    root: &'a Value,
}

impl Importer<'_> {
    /// Returns the imported node and whether it admitted `null`.
    fn import(&self, node: &Value, path: &str, depth: usize) -> Result<(Schema, bool), SchemaError> {
        let unsupported = |reason: String| SchemaError::Unsupported {
            path: path.to_string(),
            reason,
        };

        let Some(obj) = node.as_object() else {
            return Err(unsupported(format!("expected a schema object, found {node}")));
        };
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            if depth >= MAX_REF_DEPTH {
                return Err(unsupported("recursive $ref".to_string()));
            }
            let target = self
                .resolve(reference)
                .ok_or_else(|| unsupported(format!("unresolvable $ref '{reference}'")))?;
            let (schema, nullable) = self.import(target, reference, depth + 1)?;
            return Ok((with_description(schema, description), nullable));
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = obj.get(key) {
                let non_null: Vec<&Value> = branches.iter().filter(|b| !is_null_type(b)).collect();
                let nullable = non_null.len() < branches.len();
                if non_null.len() != 1 {
                    return Err(unsupported(format!("{key} with {} non-null branches", non_null.len())));
                }
                let (schema, inner_nullable) =
                    self.import(non_null[0], &format!("{path}/{key}"), depth + 1)?;
                return Ok((with_description(schema, description), nullable || inner_nullable));
            }
        }

        let (ty, nullable) = match obj.get("type") {
            Some(Value::String(ty)) => (Some(ty.as_str()), false),
            Some(Value::Array(types)) => {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                let non_null: Vec<&str> = names.iter().copied().filter(|t| *t != "null").collect();
                if non_null.len() != 1 {
                    return Err(unsupported(format!("type union {names:?}")));
                }
                (Some(non_null[0]), non_null.len() < names.len())
            }
            Some(other) => return Err(unsupported(format!("invalid type {other}"))),
            None => (None, false),
        };

        if let Some(Value::Array(values)) = obj.get("enum") {
            let labels: Vec<String> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    v.as_str()
                        .map(ToString::to_string)
                        .ok_or_else(|| unsupported(format!("non-string enum value {v}")))
                })
                .collect::<Result<_, _>>()?;
            let nullable = nullable || values.iter().any(Value::is_null);
            return Ok((Schema::Enum { values: labels, description }, nullable));
        }

        let schema = match ty {
            Some("boolean") => Schema::Boolean { description },
            Some("integer") => Schema::Integer { description },
            Some("number") => Schema::Number { description },
            Some("string") => Schema::String { description },
            Some("array") => {
                let items = obj
                    .get("items")
                    .ok_or_else(|| unsupported("array without items".to_string()))?;
                let (items, _) = self.import(items, &format!("{path}/items"), depth + 1)?;
                Schema::Array {
                    items: Box::new(items),
                    description,
                }
            }
            Some("object") => {
                let properties = obj
                    .get("properties")
                    .and_then(Value::as_object)
                    .ok_or_else(|| unsupported("object without properties".to_string()))?;
                let required: Vec<&str> = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let mut fields = Vec::with_capacity(properties.len());
                for (name, property) in properties {
                    let (schema, field_nullable) =
                        self.import(property, &format!("{path}/properties/{name}"), depth + 1)?;
                    fields.push(Field {
                        name: name.clone(),
                        schema,
                        required: required.contains(&name.as_str()) && !field_nullable,
                    });
                }
                Schema::Object { fields, description }
            }
            Some(other) => return Err(unsupported(format!("type '{other}'"))),
            None => return Err(unsupported("missing type".to_string())),
        };
        Ok((schema, nullable))
    }

    fn resolve(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        self.root.pointer(pointer)
    }
}

fn is_null_type(node: &Value) -> bool {
    node.get("type").and_then(Value::as_str) == Some("null")
}

fn with_description(schema: Schema, description: Option<String>) -> Schema {
    match description {
        Some(text) => schema.describe(text),
        None => schema,
    }
}

//! Parameter schemas and tool declarations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// One named parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Element type for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParameterType>,
    pub required: bool,
}

impl ParameterSpec {
    fn to_json(&self) -> serde_json::Value {
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), self.kind.to_string().into());
        prop.insert("description".into(), self.description.clone().into());
        if let Some(ref values) = self.enum_values {
            prop.insert("enum".into(), serde_json::json!(values));
        }
        if let Some(items) = self.items {
            prop.insert("items".into(), serde_json::json!({ "type": items.to_string() }));
        }
        serde_json::Value::Object(prop)
    }
}

/// Object schema describing a tool's input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub parameters: Vec<ParameterSpec>,
}

impl ToolSchema {
    /// Schema with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building an object schema.
    pub fn object() -> SchemaBuilder {
        SchemaBuilder {
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON-Schema-like form sent to providers:
    /// `{type: "object", properties: {...}, required: [...]}`.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_json()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Builder for [`ToolSchema`].
pub struct SchemaBuilder {
    parameters: Vec<ParameterSpec>,
}

impl SchemaBuilder {
    fn push(
        mut self,
        name: impl Into<String>,
        kind: ParameterType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind,
            description: description.into(),
            enum_values: None,
            items: None,
            required,
        });
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.push(name, ParameterType::String, description, required)
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.push(name, ParameterType::Number, description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.push(name, ParameterType::Integer, description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.push(name, ParameterType::Boolean, description, required)
    }

    /// Add an array property whose elements have type `items`.
    pub fn array(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        items: ParameterType,
        required: bool,
    ) -> Self {
        self = self.push(name, ParameterType::Array, description, required);
        if let Some(last) = self.parameters.last_mut() {
            last.items = Some(items);
        }
        self
    }

    /// Add a string property constrained to `values`.
    pub fn string_enum(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self = self.push(name, ParameterType::String, description, required);
        if let Some(last) = self.parameters.last_mut() {
            last.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        }
        self
    }

    pub fn build(self) -> ToolSchema {
        ToolSchema {
            parameters: self.parameters,
        }
    }
}

/// Declaration of a tool as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub schema: ToolSchema,
}

impl ToolDeclaration {
    pub fn input_schema(&self) -> serde_json::Value {
        self.schema.to_json_schema()
    }
}

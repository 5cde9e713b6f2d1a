use serde_json::{json, Map, Value};

use super::context::ContractVariant;
use super::response::{Accuracy, FailureReason};

pub const FIELD_ANALYSIS_SUCCESS: &str = "analysisSuccess";
pub const FIELD_HEIGHT_CM: &str = "heightCm";
pub const FIELD_WEIGHT_KG: &str = "weightKg";
pub const FIELD_ACCURACY: &str = "accuracy";
pub const FIELD_REASON: &str = "reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Number,
    String,
}

impl FieldKind {
    fn gemini_type(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Number => "NUMBER",
            Self::String => "STRING",
        }
    }

    fn json_schema_type(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub enum_values: Vec<&'static str>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    variant: ContractVariant,
    fields: Vec<SchemaField>,
}

impl ResponseSchema {
    pub fn for_variant(variant: ContractVariant) -> Self {
        let mut fields = vec![
            SchemaField {
                name: FIELD_ANALYSIS_SUCCESS,
                kind: FieldKind::Boolean,
                description: "true when height and weight could be estimated",
                enum_values: Vec::new(),
                required: true,
            },
            SchemaField {
                name: FIELD_HEIGHT_CM,
                kind: FieldKind::Number,
                description: "estimated height in centimeters, 0 when analysis failed",
                enum_values: Vec::new(),
                required: true,
            },
            SchemaField {
                name: FIELD_WEIGHT_KG,
                kind: FieldKind::Number,
                description: "estimated weight in kilograms, 0 when analysis failed",
                enum_values: Vec::new(),
                required: true,
            },
        ];
        if variant.reports_accuracy() {
            fields.push(SchemaField {
                name: FIELD_ACCURACY,
                kind: FieldKind::String,
                description: "confidence tier derived from the scale reference that was used",
                enum_values: Accuracy::ALL.iter().map(|tier| tier.as_str()).collect(),
                required: true,
            });
        }
        fields.push(SchemaField {
            name: FIELD_REASON,
            kind: FieldKind::String,
            description: "why analysis failed; only set when analysisSuccess is false",
            enum_values: FailureReason::declared_for(variant)
                .iter()
                .map(|reason| reason.as_str())
                .collect(),
            required: false,
        });
        Self { variant, fields }
    }

    pub fn variant(&self) -> ContractVariant {
        self.variant
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
            .collect()
    }

    pub fn to_gemini_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = Map::new();
            property.insert(
                "type".to_string(),
                Value::String(field.kind.gemini_type().to_string()),
            );
            property.insert(
                "description".to_string(),
                Value::String(field.description.to_string()),
            );
            if !field.enum_values.is_empty() {
                property.insert("enum".to_string(), json!(field.enum_values));
            }
            properties.insert(field.name.to_string(), Value::Object(property));
        }
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.required(),
            "propertyOrdering": self.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
        })
    }

    /// Strict JSON Schema for OpenAI structured outputs. Strict mode needs
    /// every property listed as required, so optional fields become nullable.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let base_type = field.kind.json_schema_type();
            let mut property = Map::new();
            if field.required {
                property.insert("type".to_string(), json!(base_type));
            } else {
                property.insert("type".to_string(), json!([base_type, "null"]));
            }
            property.insert(
                "description".to_string(),
                Value::String(field.description.to_string()),
            );
            if !field.enum_values.is_empty() {
                let mut values: Vec<Value> = field.enum_values.iter().map(|value| json!(value)).collect();
                if !field.required {
                    values.push(Value::Null);
                }
                property.insert("enum".to_string(), Value::Array(values));
            }
            properties.insert(field.name.to_string(), Value::Object(property));
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
            "additionalProperties": false,
        })
    }
}

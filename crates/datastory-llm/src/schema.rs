//! Structured-output request shapes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `response_format` block of a completion request asking for JSON matching a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: JsonSchemaSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    pub fn json_schema(schema: serde_json::Value) -> Self {
        Self {
            kind: "json_schema".to_string(),
            json_schema: JsonSchemaSpec { schema },
        }
    }

    /// Derive the schema from a Rust type.
    pub fn for_type<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        Self::json_schema(serde_json::to_value(root).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Findings {
        summary: String,
        sources: Vec<String>,
    }

    #[test]
    fn test_schema_lists_fields() {
        let fmt = ResponseFormat::for_type::<Findings>();
        assert_eq!(fmt.kind, "json_schema");
        let props = &fmt.json_schema.schema["properties"];
        assert!(props.get("summary").is_some());
        assert!(props.get("sources").is_some());
    }

    #[test]
    fn test_serializes_type_tag() {
        let fmt = ResponseFormat::json_schema(serde_json::json!({"type": "object"}));
        let v = serde_json::to_value(&fmt).unwrap();
        assert_eq!(v["type"], "json_schema");
        assert_eq!(v["json_schema"]["schema"]["type"], "object");
    }
}

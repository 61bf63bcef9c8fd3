//! JSON schema helpers for structured model output.
//!
//! Schemas derived here serve two purposes: restating the expected shape
//! inside a hardened retry prompt, and validating the parsed response.

use schemars::{schema_for, JsonSchema};

/// Types that can describe themselves as a JSON schema for prompting.
pub trait StructuredOutput: JsonSchema + serde::de::DeserializeOwned {
    /// JSON schema for this type, suitable for embedding in a prompt.
    fn output_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Human-readable type name for logging.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("unknown")
    }
}

impl<T: JsonSchema + serde::de::DeserializeOwned> StructuredOutput for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Sample {
        #[allow(dead_code)]
        title: String,
        #[allow(dead_code)]
        score: f64,
    }

    #[test]
    fn test_schema_includes_fields() {
        let schema = Sample::output_schema();
        let text = schema.to_string();
        assert!(text.contains("title"));
        assert!(text.contains("score"));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Sample::type_name(), "Sample");
    }
}

//! JSON Schema wrapper used by plugin descriptors

use crate::error::{RelayError, SchemaViolation};
use jsonschema::JSONSchema;
use schemars::JsonSchema;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled JSON Schema
///
/// Cheap to clone; the compiled form is shared.
#[derive(Clone)]
pub struct Schema {
    source: Value,
    compiled: Option<Arc<JSONSchema>>,
}

impl Schema {
    /// Schema accepting every value
    #[must_use]
    pub fn any() -> Self {
        Self {
            source: Value::Bool(true),
            compiled: None,
        }
    }

    /// Compile a schema document
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidSchema`] if the document is not a valid
    /// schema.
    pub fn new(source: Value) -> Result<Self, RelayError> {
        let compiled = JSONSchema::compile(&source)
            .map_err(|err| RelayError::InvalidSchema(err.to_string()))?;
        Ok(Self {
            compiled: Some(Arc::new(compiled)),
            source,
        })
    }

    /// Derive the schema of a Rust type
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidSchema`] if the generated document does
    /// not compile.
    pub fn of<T: JsonSchema>() -> Result<Self, RelayError> {
        let root = schemars::schema_for!(T);
        let source =
            serde_json::to_value(root).map_err(|err| RelayError::InvalidSchema(err.to_string()))?;
        Self::new(source)
    }

    /// Schema document
    #[must_use]
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Validate an instance, collecting every violation
    ///
    /// # Errors
    /// Returns the violations when the instance does not conform.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<SchemaViolation>> {
        let Some(compiled) = &self.compiled else {
            return Ok(());
        };
        compiled.validate(instance).map_err(|errors| {
            errors
                .map(|err| SchemaViolation::new(err.instance_path.to_string(), err.to_string()))
                .collect()
        })
    }

    /// Whether an instance conforms
    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled
            .as_ref()
            .map_or(true, |compiled| compiled.is_valid(instance))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema, serde::Deserialize)]
    #[allow(dead_code)]
    struct CohortInput {
        metric: String,
        days: u32,
    }

    fn cohort_schema() -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "metric": { "enum": ["churn", "engagement"] },
                "days": { "type": "integer", "minimum": 1 }
            },
            "required": ["metric"]
        }))
        .unwrap()
    }

    #[test]
    fn valid_instance_passes() {
        assert!(cohort_schema().validate(&json!({ "metric": "churn", "days": 7 })).is_ok());
    }

    #[test]
    fn violations_carry_paths() {
        let violations = cohort_schema()
            .validate(&json!({ "metric": "weekly", "days": 0 }))
            .unwrap_err();
        let paths: Vec<_> = violations.iter().map(|v| v.instance_path.as_str()).collect();
        assert!(paths.contains(&"/metric"));
        assert!(paths.contains(&"/days"));
    }

    #[test]
    fn missing_required_reports_root() {
        let violations = cohort_schema().validate(&json!({})).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/");
        assert!(violations[0].message.contains("metric"));
    }

    #[test]
    fn any_accepts_everything() {
        let schema = Schema::any();
        assert!(schema.validate(&json!(null)).is_ok());
        assert!(schema.is_valid(&json!([1, 2])));
    }

    #[test]
    fn invalid_document_is_rejected() {
        let err = Schema::new(json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, RelayError::InvalidSchema(_)));
    }

    #[test]
    fn derived_schema_validates() {
        let schema = Schema::of::<CohortInput>().unwrap();
        assert!(schema.is_valid(&json!({ "metric": "churn", "days": 3 })));
        assert!(!schema.is_valid(&json!({ "metric": "churn" })));
    }
}

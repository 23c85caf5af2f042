pub mod research;

use std::future::Future;
use std::pin::Pin;

use crate::engine::types::ActionDefinition;
use crate::error::Error;

/// Output of an action execution.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub content: String,
    pub is_error: bool,
}

impl ActionOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait for data-retrieval actions the gate can execute on approval.
///
/// Uses `Pin<Box<dyn Future>>` return type for dyn-compatibility,
/// allowing actions to be stored as `Arc<dyn Action>`.
pub trait Action: Send + Sync {
    fn definition(&self) -> ActionDefinition;

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, Error>> + Send + '_>>;
}

/// Validate action input against the action's declared JSON Schema.
///
/// Returns `Ok(())` if valid, `Err(error_message)` if the input does not
/// conform. Both engine-proposed arguments and edited replacement arguments
/// pass through this before execution.
pub fn validate_action_input(
    schema: &serde_json::Value,
    input: &serde_json::Value,
) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            // If the schema itself is invalid, skip validation rather than
            // rejecting every call. Log a warning for the operator.
            tracing::warn!(error = %e, "invalid action schema, skipping validation");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(input)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Input validation failed: {}", errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_output_success() {
        let output = ActionOutput::success("result data");
        assert_eq!(output.content, "result data");
        assert!(!output.is_error);
    }

    #[test]
    fn action_output_error() {
        let output = ActionOutput::error("something failed");
        assert_eq!(output.content, "something failed");
        assert!(output.is_error);
    }

    #[test]
    fn validate_accepts_valid_input() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string"}
            },
            "required": ["ticker"]
        });
        let input = json!({"ticker": "TATAMOTORS.NS"});
        assert!(validate_action_input(&schema, &input).is_ok());
    }

    #[test]
    fn validate_rejects_missing_required() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string"}
            },
            "required": ["ticker"]
        });
        let input = json!({});
        let err = validate_action_input(&schema, &input).unwrap_err();
        assert!(err.contains("validation failed"), "got: {err}");
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string"}
            },
            "required": ["ticker"]
        });
        let input = json!({"ticker": 42});
        let err = validate_action_input(&schema, &input).unwrap_err();
        assert!(err.contains("validation failed"), "got: {err}");
    }

    #[test]
    fn validate_accepts_any_for_minimal_schema() {
        let schema = json!({"type": "object"});
        let input = json!({});
        assert!(validate_action_input(&schema, &input).is_ok());
    }

    #[test]
    fn validate_skips_on_invalid_schema() {
        // An invalid schema should not block action execution.
        let schema = json!({"type": "not-a-real-type"});
        let input = json!({"anything": true});
        assert!(validate_action_input(&schema, &input).is_ok());
    }

    #[test]
    fn validate_accepts_extra_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string"}
            },
            "required": ["ticker"]
        });
        let input = json!({"ticker": "TCS.NS", "extra": true});
        assert!(validate_action_input(&schema, &input).is_ok());
    }
}

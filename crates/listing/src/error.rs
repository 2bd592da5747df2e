use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::schema::FieldError;

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// The request never reached the model
    #[error("invalid input for {flow}: {}", join_errors(.errors))]
    InputValidation { flow: String, errors: Vec<FieldError> },

    #[error("model call failed in {flow}: {message}")]
    ModelInvocation { flow: String, message: String },

    /// The model answered, but not in the promised shape
    #[error("model output for {flow} rejected: {reason}")]
    OutputValidation {
        flow: String,
        reason: String,
        errors: Vec<FieldError>,
    },

    #[error("flow {flow} is disabled")]
    Disabled { flow: String },
}

fn join_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// What callers receive instead of a success payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
}

impl FlowError {
    pub fn flow(&self) -> &str {
        match self {
            FlowError::InputValidation { flow, .. }
            | FlowError::ModelInvocation { flow, .. }
            | FlowError::OutputValidation { flow, .. }
            | FlowError::Disabled { flow } => flow,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::InputValidation { .. } => "input_validation",
            FlowError::ModelInvocation { .. } => "model_invocation",
            FlowError::OutputValidation { .. } => "output_validation",
            FlowError::Disabled { .. } => "disabled",
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            FlowError::InputValidation { errors, .. } | FlowError::OutputValidation { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let errors = self.field_errors();
        let field_errors = if errors.is_empty() {
            None
        } else {
            let mut by_path: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for e in errors {
                by_path
                    .entry(e.path.clone())
                    .or_default()
                    .push(format!("expected {}, got {}", e.expected, e.actual));
            }
            Some(by_path)
        };

        ErrorPayload {
            message: self.to_string(),
            field_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_error_payload() {
        let err = FlowError::InputValidation {
            flow: "create-listing".to_string(),
            errors: vec![
                FieldError::new("cost", "number", "string"),
                FieldError::new("margin", "number", "nothing"),
            ],
        };

        assert_eq!(
            err.to_string(),
            "invalid input for create-listing: cost: expected number, got string; margin: expected number, got nothing"
        );
        assert_eq!(
            serde_json::to_value(err.to_payload()).unwrap(),
            json!({
                "message": err.to_string(),
                "fieldErrors": {
                    "cost": ["expected number, got string"],
                    "margin": ["expected number, got nothing"],
                }
            })
        );
    }

    #[test]
    fn test_model_error_payload_has_no_field_errors() {
        let err = FlowError::ModelInvocation {
            flow: "parse-chat".to_string(),
            message: "503 Service Unavailable".to_string(),
        };
        let payload = serde_json::to_value(err.to_payload()).unwrap();
        assert_eq!(payload, json!({"message": "model call failed in parse-chat: 503 Service Unavailable"}));
        assert_eq!(err.kind(), "model_invocation");
        assert_eq!(err.flow(), "parse-chat");
    }
}

/// Collaborator response that could not be turned into a domain value.
#[derive(Debug, thiserror::Error)]
pub enum IntentDecodeError {
    #[error("collaborator returned no output")]
    Empty,

    #[error("collaborator reported an error: {message}")]
    Collaborator { message: String },

    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("field '{field}' must be {expected}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Step failure inside the pipeline. Never leaves [`crate::SafetyPipeline`]:
/// each variant is converted into an error intent or a fail-safe assessment.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("intent resolution failed: {0}")]
    Resolution(#[from] IntentDecodeError),

    #[error("command generation failed: {message}")]
    Generation { message: String },

    #[error("risk assessment failed: {message}")]
    Assessment { message: String },

    #[error("failed to encode intent: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_display() {
        let err = IntentDecodeError::FieldType {
            field: "filters",
            expected: "a list of strings",
        };
        assert_eq!(err.to_string(), "field 'filters' must be a list of strings");
    }

    #[test]
    fn resolution_wraps_decode_error() {
        let err: PipelineError = IntentDecodeError::Empty.into();
        assert_eq!(
            err.to_string(),
            "intent resolution failed: collaborator returned no output"
        );
    }

    #[test]
    fn generation_display() {
        let err = PipelineError::Generation {
            message: "ERROR: no handler".into(),
        };
        assert_eq!(err.to_string(), "command generation failed: ERROR: no handler");
    }
}

//! Error types shared across the trainer core.

use std::time::Duration;

/// A backend cannot be constructed from the given settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing API credential for provider '{0}'")]
    MissingCredential(String),
    #[error("Invalid backend setting {0}: {1}")]
    InvalidSetting(String, String),
}

/// A failed call to the chat-completion backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Backend request failed: {0}")]
    Backend(String),
    #[error("Backend returned an empty response")]
    EmptyResponse,
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend call was cancelled")]
    Cancelled,
}

/// The coach reply did not follow the `comment | tag,tag` format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed coach advice: {0}")]
pub struct AdviceFormatError(pub String);

/// The evaluation report could not be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Backend(#[from] AdapterError),
    #[error("Evaluation response is not a valid report: {0}")]
    Malformed(String),
    #[error("Evaluation field '{field}' out of range: {value}")]
    OutOfRange { field: String, value: f64 },
}

/// A session operation was refused or failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("A request for this session is already in progress")]
    Busy,
    #[error("Session is already finished")]
    Finished,
    #[error("Nothing to evaluate: the trainee has not replied yet")]
    NothingToEvaluate,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigurationError::MissingCredential("openai".to_string()).to_string(),
            "Missing API credential for provider 'openai'"
        );
        assert_eq!(
            SessionError::from(AdapterError::Backend("503".to_string())).to_string(),
            "Backend request failed: 503"
        );
        assert_eq!(
            EvaluationError::OutOfRange {
                field: "overallScore".to_string(),
                value: 140.0
            }
            .to_string(),
            "Evaluation field 'overallScore' out of range: 140"
        );
    }
}

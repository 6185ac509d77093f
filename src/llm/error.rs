use std::time::Duration;
use thiserror::Error;

/// Failures on the path from prompt to validated reply. None of these escape
/// `ModelService::get_response`; they become the error marker of a degraded
/// response instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error("user input is empty")]
    EmptyInput,
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("backend returned an empty completion")]
    EmptyCompletion,
    #[error("malformed completion: {0}")]
    MalformedCompletion(String),
    #[error("reply violates the response contract: {0}")]
    ContractViolation(String),
}

impl LlmError {
    /// The backend could not be reached or did not answer in time.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::Status { .. } | LlmError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e.to_string())
    }
}

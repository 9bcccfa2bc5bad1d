use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Resolution error: {reason}")]
    Resolution {
        reason: String,
        available: Vec<String>,
    },

    #[error("Report decomposition error: {0}")]
    Report(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("Sandbox rejected procedure: {0}")]
    Sandbox(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for AssistantError {
    fn from(err: polars::error::PolarsError) -> Self {
        AssistantError::Polars(err.to_string())
    }
}

impl From<csv::Error> for AssistantError {
    fn from(err: csv::Error) -> Self {
        AssistantError::Csv(err.to_string())
    }
}

impl AssistantError {
    /// Message safe to show an end user. Raw engine errors and generated code stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Validation(reason) => reason.clone(),
            AssistantError::Classification(_) => "could not understand request".to_string(),
            AssistantError::Resolution { reason, .. } => reason.clone(),
            AssistantError::Report(_) => "could not break the report into sub-queries".to_string(),
            AssistantError::Store(_) | AssistantError::Io(_) | AssistantError::Csv(_) => {
                "the data store is unavailable".to_string()
            }
            _ => "the request could not be processed".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

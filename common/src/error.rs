use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Citation error: {0}")]
    Citation(String),
    #[error("Deadline exceeded: {0}")]
    Timeout(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl AppError {
    /// Whether the ingestion worker may retry after this error. Client input
    /// problems are terminal; provider and store hiccups are assumed transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Auth(_) | Self::Citation(_)
        )
    }
}

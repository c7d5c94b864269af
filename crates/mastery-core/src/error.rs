use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasteryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid question: {0}")]
    InvalidQuestion(String),

    #[error("question source error: {0}")]
    QuestionSource(String),
}

pub type MasteryResult<T> = Result<T, MasteryError>;

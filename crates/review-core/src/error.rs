use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Validation failed: {}", .0.join(" "))]
    ValidationError(Vec<String>),

    /// The provider refused the prompt itself. Carries the raw `promptFeedback` payload.
    #[error("Prompt blocked by provider: {0}")]
    PromptBlocked(serde_json::Value),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Gemini APIから有効なテキストが返されませんでした")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, AppError>;

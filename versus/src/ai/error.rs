use thiserror::Error;

use crate::ai::provider::ProviderKind;

#[derive(Debug, Error)]
pub enum AIError {
    #[error("API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
    #[error("Missing configuration for {kind}: {field}")]
    MissingConfig { kind: ProviderKind, field: &'static str },
    #[error(
        "Model {model} cannot read {media_type} attachments. Models that can: {}",
        model_list(.capable_models)
    )]
    UnsupportedAttachment {
        model: String,
        media_type: String,
        capable_models: Vec<String>,
    },
}

fn model_list(models: &[String]) -> String {
    if models.is_empty() {
        "none for this provider".to_string()
    } else {
        models.join(", ")
    }
}

impl AIError {
    pub(crate) fn unparseable() -> Self {
        AIError::ParseError("could not parse response".to_string())
    }
}

//! Wire types shared by the relay service and its clients.

use serde::{Deserialize, Serialize};

use crate::ai::provider::ProviderKind;
use crate::ai::AIError;
use crate::model::Attachment;

pub const PROXY_PATH: &str = "/api/ai/proxy";
pub const MODELS_PATH: &str = "/api/ollama/models";
pub const DATA_PATH: &str = "/api/data";

/// Body of `POST /api/ai/proxy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// Error body returned by the relay with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of `POST /api/ollama/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelListRequest {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<LocalModel>,
}

/// POST a request to the relay's proxy endpoint and return the provider's raw
/// JSON. Non-2xx responses become [`AIError::ApiError`] carrying the body.
pub(crate) async fn send_via_relay(
    client: &reqwest::Client,
    relay_url: &str,
    request: &RelayRequest,
) -> Result<serde_json::Value, AIError> {
    let url = format!("{}{}", relay_url.trim_end_matches('/'), PROXY_PATH);
    tracing::debug!(
        "Relaying {} request for model {} to {}",
        request.provider,
        request.model,
        url
    );

    let response = client.post(&url).json(request).send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AIError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| AIError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
}

//! Ollama Client for Local AI
//!
//! The local server is called directly at its configured endpoint; it is
//! already on the user's machine so there is nothing to relay.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ai::provider::{AIProvider, ProviderKind};
use crate::ai::relay::{LocalModel, ModelListResponse};
use crate::ai::AIError;
use crate::model::Attachment;

/// Client for interacting with Ollama
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32, // max tokens
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    details: Option<OllamaTagDetails>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagDetails {
    #[serde(default)]
    family: Option<String>,
}

impl OllamaClient {
    /// Create a new Ollama client, falling back to the default endpoint and model
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| {
                ProviderKind::Ollama
                    .default_endpoint()
                    .unwrap_or_default()
                    .to_string()
            }),
            model: model.unwrap_or_else(|| ProviderKind::Ollama.default_model().to_string()),
        }
    }

    /// Use a shared HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List models installed on the server
    pub async fn list_models(&self) -> Result<ModelListResponse, AIError> {
        list_local_models(&self.client, &self.base_url).await
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
impl AIProvider for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
        max_tokens: u32,
    ) -> Result<String, AIError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let images = attachment
            .filter(|a| a.media_type.starts_with("image/"))
            .map(|a| vec![a.data.clone()])
            .unwrap_or_default();

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            images,
            options: OllamaOptions {
                temperature: 0.2, // extraction wants consistent output
                num_predict: max_tokens,
            },
        };

        tracing::debug!("Sending request to Ollama: {}", self.model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AIError::ApiError { status, message });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AIError::InvalidResponse(e.to_string()))?;

        Ok(ollama_response.response)
    }
}

/// Query `{base_url}/api/tags` and flatten it into the relay's model list shape.
pub async fn list_local_models(
    client: &Client,
    base_url: &str,
) -> Result<ModelListResponse, AIError> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(AIError::ApiError {
            status: response.status().as_u16(),
            message: "Failed to list models".to_string(),
        });
    }

    let tags: OllamaTags = response
        .json()
        .await
        .map_err(|e| AIError::InvalidResponse(e.to_string()))?;

    Ok(ModelListResponse {
        models: tags
            .models
            .into_iter()
            .map(|t| LocalModel {
                name: t.name,
                size: t.size,
                modified: t.modified_at,
                family: t.details.and_then(|d| d.family),
            })
            .collect(),
    })
}

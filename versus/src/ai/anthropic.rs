use async_trait::async_trait;
use reqwest::Client;

use crate::ai::provider::{AIProvider, ProviderKind};
use crate::ai::relay::{send_via_relay, RelayRequest};
use crate::ai::AIError;
use crate::model::Attachment;

/// Claude via the relay's proxy endpoint.
pub struct AnthropicClient {
    client: Client,
    relay_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    /// Create a new Anthropic client that sends through the relay at `relay_url`
    pub fn new(relay_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            relay_url: relay_url.into(),
            api_key: api_key.into(),
            model: ProviderKind::Anthropic.default_model().to_string(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a shared HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl AIProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
        if self.api_key.trim().is_empty() {
            return Err(AIError::MissingConfig {
                kind: ProviderKind::Anthropic,
                field: "API key",
            });
        }

        let request = RelayRequest {
            provider: ProviderKind::Anthropic,
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens,
            attachment: attachment.cloned(),
        };
        let body = send_via_relay(&self.client, &self.relay_url, &request).await?;
        extract_message_text(&body)
    }
}

/// Concatenates the `text` blocks of a Messages API response.
pub(crate) fn extract_message_text(body: &serde_json::Value) -> Result<String, AIError> {
    let blocks = body
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| AIError::InvalidResponse("Missing content array in response".to_string()))?;

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text")
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(AIError::InvalidResponse(
            "Empty content array in response".to_string(),
        ));
    }
    Ok(text.join(""))
}

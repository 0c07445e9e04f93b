use async_trait::async_trait;
use reqwest::Client;

use crate::ai::provider::{AIProvider, ProviderKind};
use crate::ai::relay::{send_via_relay, RelayRequest};
use crate::ai::AIError;
use crate::model::Attachment;

/// OpenAI chat completions via the relay's proxy endpoint.
pub struct OpenAiClient {
    client: Client,
    relay_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Create a new OpenAI client that sends through the relay at `relay_url`
    pub fn new(relay_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            relay_url: relay_url.into(),
            api_key: api_key.into(),
            model: ProviderKind::OpenAi.default_model().to_string(),
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
impl AIProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
                kind: ProviderKind::OpenAi,
                field: "API key",
            });
        }

        let request = RelayRequest {
            provider: ProviderKind::OpenAi,
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens,
            attachment: attachment.cloned(),
        };
        let body = send_via_relay(&self.client, &self.relay_url, &request).await?;
        extract_choice_text(&body)
    }
}

/// `choices[0].message.content` of a chat completion.
pub(crate) fn extract_choice_text(body: &serde_json::Value) -> Result<String, AIError> {
    body.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| AIError::InvalidResponse("No message content in choices".to_string()))
}

//! Provider adapters
//!
//! `ProviderAdapter` is a tagged union over the provider kinds. Each variant
//! wraps the client for that kind; the analysis pipeline around the single
//! completion call (capability gate, prompt, normalization, progress) is
//! shared and dispatched by matching on the variant.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ai::anthropic::AnthropicClient;
use crate::ai::normalizer::normalize;
use crate::ai::ollama::OllamaClient;
use crate::ai::openai::OpenAiClient;
use crate::ai::progress::{NoProgress, ProgressEvent, ProgressObserver, ProgressPhase};
use crate::ai::prompts::{build_prompt, CONNECTION_TEST_PROMPT};
use crate::ai::provider::{
    capable_models, is_restricted_media, supports_attachment, AIProvider, ModelInfo,
    ProviderConfig, ProviderKind,
};
use crate::ai::types::{AnalysisContent, AnalysisRequest, AnalysisResult};
use crate::ai::AIError;
use crate::model::Attachment;

const ANALYSIS_MAX_TOKENS: u32 = 4096;
const CONNECTION_TEST_MAX_TOKENS: u32 = 10;

pub enum ProviderAdapter {
    Anthropic(AnthropicClient),
    OpenAi(OpenAiClient),
    Ollama(OllamaClient),
}

impl ProviderAdapter {
    /// Bind an adapter to a stored config. Cloud kinds are reached through the
    /// relay at `relay_url`; the local kind uses the config's endpoint.
    pub fn from_config(config: &ProviderConfig, relay_url: &str) -> Result<Self, AIError> {
        if let Some(field) = config.missing_field() {
            return Err(AIError::MissingConfig {
                kind: config.kind,
                field,
            });
        }
        let model = config.model.trim().to_string();

        Ok(match config.kind {
            ProviderKind::Anthropic => ProviderAdapter::Anthropic(
                AnthropicClient::new(relay_url, config.credential().unwrap_or_default())
                    .with_model(model),
            ),
            ProviderKind::OpenAi => ProviderAdapter::OpenAi(
                OpenAiClient::new(relay_url, config.credential().unwrap_or_default())
                    .with_model(model),
            ),
            ProviderKind::Ollama => ProviderAdapter::Ollama(OllamaClient::new(
                config.endpoint().map(str::to_string),
                Some(model),
            )),
        })
    }

    fn backend(&self) -> &dyn AIProvider {
        match self {
            ProviderAdapter::Anthropic(client) => client,
            ProviderAdapter::OpenAi(client) => client,
            ProviderAdapter::Ollama(client) => client,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.backend().kind()
    }

    pub fn model(&self) -> &str {
        self.backend().model()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.backend().model_info()
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        self.analyze_with_progress(request, &NoProgress).await
    }

    pub async fn analyze_with_progress(
        &self,
        request: &AnalysisRequest,
        observer: &dyn ProgressObserver,
    ) -> AnalysisResult {
        let notify = |phase: ProgressPhase, message: String| {
            observer.on_progress(&ProgressEvent {
                phase,
                provider: self.kind(),
                message,
            });
        };

        notify(
            ProgressPhase::Preparing,
            format!("Preparing {} request", request.kind),
        );

        let result = self.run(request, &notify).await;
        match &result {
            Ok(_) => notify(ProgressPhase::Done, "Analysis complete".to_string()),
            Err(e) => notify(ProgressPhase::Error, e.to_string()),
        }
        result
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        notify: &(dyn Fn(ProgressPhase, String) + Sync),
    ) -> AnalysisResult {
        let mut prompt = build_prompt(request);

        let attachment = match &request.content {
            AnalysisContent::Binary(attachment) if is_restricted_media(&attachment.media_type) => {
                self.check_capability(attachment)?;
                Some(attachment)
            }
            AnalysisContent::Binary(attachment) => {
                prompt.push_str("\n\nAttached file content:\n");
                prompt.push_str(&decode_text_attachment(attachment)?);
                None
            }
            AnalysisContent::Text { .. } => None,
        };

        notify(
            ProgressPhase::Contacting,
            format!("Contacting {} ({})", self.kind().display_name(), self.model()),
        );
        tracing::info!(
            "Using AI provider: {} model {} for {}",
            self.kind(),
            self.model(),
            request.kind
        );
        let raw = self
            .backend()
            .complete(&prompt, attachment, ANALYSIS_MAX_TOKENS)
            .await?;

        notify(ProgressPhase::Processing, "Reading response".to_string());
        normalize(&raw, request.kind)
    }

    fn check_capability(&self, attachment: &Attachment) -> Result<(), AIError> {
        if supports_attachment(self.kind(), self.model(), &attachment.media_type) {
            return Ok(());
        }
        Err(AIError::UnsupportedAttachment {
            model: self.model().to_string(),
            media_type: attachment.media_type.clone(),
            capable_models: capable_models(self.kind(), &attachment.media_type)
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Minimal-cost round trip. Never fails; any error reads as `false`.
    pub async fn test_connection(&self) -> bool {
        match self
            .backend()
            .complete(CONNECTION_TEST_PROMPT, None, CONNECTION_TEST_MAX_TOKENS)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Connection test for {} failed: {}", self.kind(), e);
                false
            }
        }
    }
}

fn decode_text_attachment(attachment: &Attachment) -> Result<String, AIError> {
    let bytes = BASE64
        .decode(attachment.data.trim())
        .map_err(|e| AIError::InvalidAttachment(format!("not valid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| {
        AIError::InvalidAttachment(format!("{} content is not UTF-8 text", attachment.media_type))
    })
}

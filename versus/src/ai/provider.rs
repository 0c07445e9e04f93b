//! AI Provider Trait
//!
//! Defines the provider kinds, their persisted configuration, the attachment
//! capability table and the completion contract every backend implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ai::AIError;
use crate::model::Attachment;

/// Known providers. Two cloud APIs reached through the relay and one local server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "Claude (Anthropic)",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Ollama => "Ollama (local)",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Ollama => "llama3.1:8b",
        }
    }

    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("http://localhost:11434"),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Settings for one provider kind. The registry holds at most one per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API key; not needed for the local kind
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Base URL; required for the local kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ProviderConfig {
    /// Enabled config with the kind's default model and endpoint.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            credential: None,
            endpoint: kind.default_endpoint().map(str::to_string),
            model: kind.default_model().to_string(),
            enabled: true,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn credential(&self) -> Option<&str> {
        non_blank(self.credential.as_deref())
    }

    pub fn endpoint(&self) -> Option<&str> {
        non_blank(self.endpoint.as_deref())
    }

    pub fn model(&self) -> Option<&str> {
        non_blank(Some(self.model.as_str()))
    }

    /// Enabled with every field its kind needs, model included.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.missing_field().is_none()
    }

    /// First configuration field that is missing, checked in the order a user
    /// would fill them in.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.kind.is_local() {
            if self.endpoint().is_none() {
                return Some("endpoint");
            }
        } else if self.credential().is_none() {
            return Some("API key");
        }
        if self.model().is_none() {
            return Some("model");
        }
        None
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Models per provider that accept restricted attachment types.
struct Capability {
    kind: ProviderKind,
    /// Exact media type, or a `type/` prefix such as `image/`
    media: &'static str,
    models: &'static [&'static str],
}

const CAPABILITIES: &[Capability] = &[
    Capability {
        kind: ProviderKind::Anthropic,
        media: "application/pdf",
        models: &[
            "claude-opus-4-20250514",
            "claude-sonnet-4-20250514",
            "claude-3-7-sonnet-20250219",
            "claude-3-5-sonnet-20241022",
            "claude-3-5-haiku-20241022",
        ],
    },
    Capability {
        kind: ProviderKind::Anthropic,
        media: "image/",
        models: &[
            "claude-opus-4-20250514",
            "claude-sonnet-4-20250514",
            "claude-3-7-sonnet-20250219",
            "claude-3-5-sonnet-20241022",
            "claude-3-5-haiku-20241022",
            "claude-3-haiku-20240307",
        ],
    },
    Capability {
        kind: ProviderKind::OpenAi,
        media: "application/pdf",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"],
    },
    Capability {
        kind: ProviderKind::OpenAi,
        media: "image/",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "gpt-4-turbo"],
    },
    Capability {
        kind: ProviderKind::Ollama,
        media: "image/",
        models: &["llava", "llama3.2-vision", "bakllava", "moondream"],
    },
];

/// Media types that only some models can read. Anything else is inlined as text.
pub fn is_restricted_media(media_type: &str) -> bool {
    media_type == "application/pdf" || media_type.starts_with("image/")
}

/// Models of `kind` that accept `media_type`.
pub fn capable_models(kind: ProviderKind, media_type: &str) -> Vec<&'static str> {
    CAPABILITIES
        .iter()
        .filter(|c| c.kind == kind && media_matches(c.media, media_type))
        .flat_map(|c| c.models.iter().copied())
        .collect()
}

/// Whether `model` of `kind` can read an attachment of `media_type`.
pub fn supports_attachment(kind: ProviderKind, model: &str, media_type: &str) -> bool {
    if !is_restricted_media(media_type) {
        return true;
    }
    capable_models(kind, media_type)
        .iter()
        .any(|capable| model_matches(kind, capable, model))
}

fn media_matches(pattern: &str, media_type: &str) -> bool {
    if pattern.ends_with('/') {
        media_type.starts_with(pattern)
    } else {
        pattern == media_type
    }
}

/// Local model names carry a tag (`llava:13b`), so they match on the base name.
fn model_matches(kind: ProviderKind, capable: &str, model: &str) -> bool {
    if kind.is_local() {
        model == capable || model.split(':').next() == Some(capable)
    } else {
        model == capable
    }
}

/// Information about an AI model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: ProviderKind,
    pub model_name: String,
    pub is_local: bool,
    /// Whether PDF documents can be attached
    pub supports_documents: bool,
}

/// Summary of the registry for settings screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub active_provider: Option<ProviderKind>,
    pub available: bool,
    pub configured: Vec<ProviderKind>,
    pub enabled: Vec<ProviderKind>,
    pub model: Option<String>,
}

/// Completion contract implemented once per provider kind.
#[async_trait]
pub trait AIProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Send one prompt and return the provider's text. Exactly one HTTP request.
    async fn complete(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
        max_tokens: u32,
    ) -> Result<String, AIError>;

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.kind(),
            model_name: self.model().to_string(),
            is_local: self.kind().is_local(),
            supports_documents: supports_attachment(self.kind(), self.model(), "application/pdf"),
        }
    }
}

pub mod adapter;
pub mod anthropic;
pub mod error;
pub mod normalizer;
pub mod ollama;
pub mod openai;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod registry;
pub mod relay;
pub mod types;

// Re-export for convenience
pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicClient;
pub use error::AIError;
pub use normalizer::normalize;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use progress::{NoProgress, ProgressEvent, ProgressLog, ProgressObserver, ProgressPhase};
pub use prompts::build_prompt;
pub use provider::{AIProvider, ModelInfo, ProviderConfig, ProviderKind, ProviderStatus};
pub use registry::{AiConfig, ProviderRegistry, RegistryStore};
pub use types::{
    AnalysisContent, AnalysisContext, AnalysisKind, AnalysisOutput, AnalysisRequest,
    AnalysisResult, ExtractedProperty, ValueSuggestion,
};

//! Analysis request and result types
//!
//! Requests are built per user-triggered analysis and discarded after the
//! result has been merged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ai::AIError;
use crate::model::{Attachment, PropertyDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisKind {
    ExtractProperties,
    GenerateSummary,
    SuggestValues,
    AnalyzeAttachment,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::ExtractProperties => "extract-properties",
            AnalysisKind::GenerateSummary => "generate-summary",
            AnalysisKind::SuggestValues => "suggest-values",
            AnalysisKind::AnalyzeAttachment => "analyze-attachment",
        }
    }

    /// Whether the provider is expected to answer with a JSON array.
    pub fn expects_json(&self) -> bool {
        matches!(
            self,
            AnalysisKind::ExtractProperties | AnalysisKind::SuggestValues
        )
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extract-properties" | "extract" => Ok(AnalysisKind::ExtractProperties),
            "generate-summary" | "summary" => Ok(AnalysisKind::GenerateSummary),
            "suggest-values" | "suggest" => Ok(AnalysisKind::SuggestValues),
            "analyze-attachment" | "attachment" => Ok(AnalysisKind::AnalyzeAttachment),
            other => Err(format!("unknown analysis kind: {}", other)),
        }
    }
}

/// What the provider is asked to look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnalysisContent {
    Text { text: String },
    Binary(Attachment),
}

impl AnalysisContent {
    pub fn text(text: impl Into<String>) -> Self {
        AnalysisContent::Text { text: text.into() }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            AnalysisContent::Binary(a) => Some(a),
            AnalysisContent::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub comparison_name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub content: AnalysisContent,
    #[serde(default)]
    pub context: AnalysisContext,
}

impl AnalysisRequest {
    pub fn new(kind: AnalysisKind, content: AnalysisContent) -> Self {
        Self {
            kind,
            content,
            context: AnalysisContext::default(),
        }
    }

    pub fn with_context(mut self, context: AnalysisContext) -> Self {
        self.context = context;
        self
    }
}

/// A property record as returned for extract-properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProperty {
    pub name: String,
    /// Type as reported by the provider; merging uses the configured type instead
    #[serde(rename = "type", default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A value suggestion as returned for suggest-values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSuggestion {
    pub property: String,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Passed through unvalidated, whatever JSON the provider sent
    #[serde(default)]
    pub confidence: Option<serde_json::Value>,
}

/// Successful analysis output, one shape per request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisOutput {
    Properties(Vec<ExtractedProperty>),
    Summary(String),
    Suggestions(Vec<ValueSuggestion>),
}

impl AnalysisOutput {
    /// Name/value pairs for merging, regardless of which JSON shape produced them.
    pub fn named_values(&self) -> Vec<(&str, &serde_json::Value)> {
        match self {
            AnalysisOutput::Properties(props) => props
                .iter()
                .map(|p| (p.name.as_str(), &p.value))
                .collect(),
            AnalysisOutput::Suggestions(suggestions) => suggestions
                .iter()
                .map(|s| (s.property.as_str(), &s.value))
                .collect(),
            AnalysisOutput::Summary(_) => Vec::new(),
        }
    }
}

pub type AnalysisResult = Result<AnalysisOutput, AIError>;

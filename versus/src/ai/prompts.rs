//! Prompt templates for each analysis kind.
//!
//! Prompts are plain strings shared by every provider. Building one touches no
//! network or state, so identical requests always produce identical prompts.

use crate::ai::types::{AnalysisContent, AnalysisContext, AnalysisKind, AnalysisRequest};
use crate::model::PropertyDefinition;

pub fn build_prompt(request: &AnalysisRequest) -> String {
    let content = describe_content(&request.content);
    let mut prompt = match request.kind {
        AnalysisKind::ExtractProperties => build_extract_prompt(&content),
        AnalysisKind::GenerateSummary => build_summary_prompt(&content),
        AnalysisKind::SuggestValues => {
            build_suggest_prompt(&content, &request.context.properties)
        }
        AnalysisKind::AnalyzeAttachment => build_attachment_prompt(&content),
    };
    append_context(&mut prompt, request.kind, &request.context);
    prompt
}

fn describe_content(content: &AnalysisContent) -> String {
    match content {
        AnalysisContent::Text { text } => text.trim().to_string(),
        AnalysisContent::Binary(attachment) => format!(
            "[Attached {} document{}]",
            attachment.media_type,
            attachment
                .file_name
                .as_deref()
                .map(|n| format!(" \"{}\"", n))
                .unwrap_or_default()
        ),
    }
}

fn build_extract_prompt(content: &str) -> String {
    format!(
        r#"You are helping build a structured comparison. Extract every property you can find in the content below.

Content:
{}

Respond ONLY with a JSON array in this exact format (no markdown, no explanation):
[
  {{"name": "Property name", "type": "text", "value": "..."}}
]

Rules for "type":
- "number" for quantities, measurements and prices (value must be a plain number, no currency symbols or units)
- "rating" for scores on a 1-5 scale (value must be an integer from 1 to 5)
- "datetime" for dates (value must be an ISO 8601 date such as "2024-05-01")
- "text" for everything else

Important: Return ONLY the JSON array, nothing else."#,
        content
    )
}

fn build_summary_prompt(content: &str) -> String {
    format!(
        r#"Summarize the following content in 2-3 sentences of plain text. Focus on what makes it distinctive when compared with alternatives.

Content:
{}

Return only the summary text, without headings or bullet points."#,
        content
    )
}

fn build_suggest_prompt(content: &str, properties: &[PropertyDefinition]) -> String {
    let property_list = if properties.is_empty() {
        "(no properties defined)".to_string()
    } else {
        properties
            .iter()
            .map(|p| format!("- {} ({})", p.name, p.property_type))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Suggest values for the following properties based on the content below.

Properties:
{}

Content:
{}

Respond ONLY with a JSON array in this exact format:
[
  {{"property": "Property name", "value": "...", "confidence": 0.8}}
]

Use the property names exactly as listed. "confidence" is a number between 0 and 1. Omit properties you cannot determine.

Important: Return ONLY the JSON array, nothing else."#,
        property_list, content
    )
}

fn build_attachment_prompt(content: &str) -> String {
    format!(
        r#"Analyze the attached material and extract the information that would be useful when comparing it against alternatives: key specifications, prices, strengths, weaknesses and anything notable.

{}"#,
        content
    )
}

fn append_context(prompt: &mut String, kind: AnalysisKind, context: &AnalysisContext) {
    let mut sections = Vec::new();

    if let Some(name) = non_empty(&context.comparison_name) {
        sections.push(format!("Comparison: {}", name));
    }
    if let Some(name) = non_empty(&context.item_name) {
        sections.push(format!("Item: {}", name));
    }
    // suggest-values already lists the properties in its body
    if kind != AnalysisKind::SuggestValues && !context.properties.is_empty() {
        let names = context
            .properties
            .iter()
            .map(|p| format!("{} ({})", p.name, p.property_type))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!("Properties of interest: {}", names));
    }
    if let Some(instructions) = non_empty(&context.custom_instructions) {
        sections.push(format!("Additional instructions: {}", instructions));
    }

    if !sections.is_empty() {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(&sections.join("\n"));
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Fixed prompt used to check connectivity.
pub const CONNECTION_TEST_PROMPT: &str = "Reply with the single word OK.";

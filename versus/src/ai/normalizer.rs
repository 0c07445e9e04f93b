//! Response normalization
//!
//! Providers often wrap their JSON in prose or markdown fences. Structured
//! kinds take the greedy span from the first `[` to the last `]` and parse it;
//! text kinds pass the trimmed response through unchanged.

use serde_json::{Map, Value};

use crate::ai::types::{
    AnalysisKind, AnalysisOutput, AnalysisResult, ExtractedProperty, ValueSuggestion,
};
use crate::ai::AIError;

pub fn normalize(raw: &str, kind: AnalysisKind) -> AnalysisResult {
    match kind {
        AnalysisKind::ExtractProperties => {
            let entries = parse_entries(raw, kind)?;
            Ok(AnalysisOutput::Properties(
                entries.iter().filter_map(extracted_property).collect(),
            ))
        }
        AnalysisKind::SuggestValues => {
            let entries = parse_entries(raw, kind)?;
            Ok(AnalysisOutput::Suggestions(
                entries.iter().filter_map(value_suggestion).collect(),
            ))
        }
        AnalysisKind::GenerateSummary | AnalysisKind::AnalyzeAttachment => {
            Ok(AnalysisOutput::Summary(raw.trim().to_string()))
        }
    }
}

/// Parses the bracket span as a JSON array. Individual entries are judged later.
fn parse_entries(raw: &str, kind: AnalysisKind) -> Result<Vec<Value>, AIError> {
    let json = extract_json_array(raw).ok_or_else(AIError::unparseable)?;
    serde_json::from_str::<Vec<Value>>(json).map_err(|e| {
        tracing::debug!("{} response did not parse: {}", kind, e);
        AIError::unparseable()
    })
}

fn string_field(entry: &Map<String, Value>, field: &str) -> Option<String> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Entries without a string `name` are skipped.
fn extracted_property(entry: &Value) -> Option<ExtractedProperty> {
    let entry = entry.as_object()?;
    Some(ExtractedProperty {
        name: string_field(entry, "name")?,
        property_type: string_field(entry, "type"),
        value: entry.get("value").cloned().unwrap_or(Value::Null),
    })
}

/// Entries without a string `property` are skipped.
fn value_suggestion(entry: &Value) -> Option<ValueSuggestion> {
    let entry = entry.as_object()?;
    Some(ValueSuggestion {
        property: string_field(entry, "property")?,
        value: entry.get("value").cloned().unwrap_or(Value::Null),
        confidence: entry.get("confidence").filter(|c| !c.is_null()).cloned(),
    })
}

/// Greedy bracket span: first `[` through last `]`, or `None`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_with_surrounding_prose() {
        let raw = r#"Here is what I found:
[{"name":"Price","type":"number","value":10},{"name":"Rating","type":"rating","value":4}]
Let me know if you need anything else."#;
        match normalize(raw, AnalysisKind::ExtractProperties).unwrap() {
            AnalysisOutput::Properties(props) => {
                assert_eq!(props.len(), 2);
                assert_eq!(props[0].name, "Price");
                assert_eq!(props[0].value, json!(10));
                assert_eq!(props[1].property_type.as_deref(), Some("rating"));
            }
            other => panic!("expected properties, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_from_markdown_fence() {
        let raw = "```json\n[{\"name\":\"Weight\",\"type\":\"number\",\"value\":1.2}]\n```";
        assert!(matches!(
            normalize(raw, AnalysisKind::ExtractProperties),
            Ok(AnalysisOutput::Properties(p)) if p.len() == 1
        ));
    }

    #[test]
    fn test_no_brackets_is_parse_failure() {
        let err = normalize("Sorry, I cannot help with that.", AnalysisKind::ExtractProperties)
            .unwrap_err();
        assert!(matches!(err, AIError::ParseError(ref m) if m == "could not parse response"));
    }

    #[test]
    fn test_malformed_json_is_parse_failure() {
        let err = normalize("[{\"name\": \"Price\", ]", AnalysisKind::SuggestValues).unwrap_err();
        assert!(matches!(err, AIError::ParseError(_)));
    }

    #[test]
    fn test_reversed_brackets() {
        assert_eq!(extract_json_array("] nothing ["), None);
    }

    #[test]
    fn test_suggestions_pass_confidence_through() {
        let raw = r#"[{"property":"Price","value":"12","confidence":1.7}]"#;
        match normalize(raw, AnalysisKind::SuggestValues).unwrap() {
            AnalysisOutput::Suggestions(s) => assert_eq!(s[0].confidence, Some(json!(1.7))),
            other => panic!("expected suggestions, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_confidence_passes_through() {
        let raw = r#"[{"property":"Price","value":12,"confidence":"high"},{"property":"Color","value":"Red","confidence":"0.8"}]"#;
        match normalize(raw, AnalysisKind::SuggestValues).unwrap() {
            AnalysisOutput::Suggestions(s) => {
                assert_eq!(s.len(), 2);
                assert_eq!(s[0].confidence, Some(json!("high")));
                assert_eq!(s[1].confidence, Some(json!("0.8")));
            }
            other => panic!("expected suggestions, got {:?}", other),
        }
    }

    #[test]
    fn test_null_type_is_accepted() {
        let raw = r#"[{"name":"Price","type":null,"value":10},{"name":"Rating","type":"rating","value":4}]"#;
        match normalize(raw, AnalysisKind::ExtractProperties).unwrap() {
            AnalysisOutput::Properties(props) => {
                assert_eq!(props.len(), 2);
                assert_eq!(props[0].property_type, None);
                assert_eq!(props[0].value, json!(10));
            }
            other => panic!("expected properties, got {:?}", other),
        }
    }

    #[test]
    fn test_entries_without_name_are_skipped() {
        let raw = r#"[{"value":3},"stray",{"name":7,"value":1},{"name":"Weight","value":2}]"#;
        match normalize(raw, AnalysisKind::ExtractProperties).unwrap() {
            AnalysisOutput::Properties(props) => {
                assert_eq!(props.len(), 1);
                assert_eq!(props[0].name, "Weight");
            }
            other => panic!("expected properties, got {:?}", other),
        }

        match normalize(r#"[{"value":"x"}]"#, AnalysisKind::SuggestValues).unwrap() {
            AnalysisOutput::Suggestions(s) => assert!(s.is_empty()),
            other => panic!("expected suggestions, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_value_becomes_null() {
        match normalize(r#"[{"name":"Price"}]"#, AnalysisKind::ExtractProperties).unwrap() {
            AnalysisOutput::Properties(props) => assert_eq!(props[0].value, Value::Null),
            other => panic!("expected properties, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_is_trimmed_and_unvalidated() {
        assert_eq!(
            normalize("  \n A fine pair of headphones. \n", AnalysisKind::GenerateSummary).unwrap(),
            AnalysisOutput::Summary("A fine pair of headphones.".to_string())
        );
        assert_eq!(
            normalize("", AnalysisKind::AnalyzeAttachment).unwrap(),
            AnalysisOutput::Summary(String::new())
        );
    }
}

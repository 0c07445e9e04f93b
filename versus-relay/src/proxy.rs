//! `POST /api/ai/proxy`: forwards one completion to a cloud provider.
//!
//! The request is rebuilt in the provider's own wire format. A 2xx upstream
//! response is returned verbatim; anything else becomes a [`RelayError`].

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use versus::ai::relay::RelayRequest;
use versus::ai::ProviderKind;
use versus::Attachment;

use crate::error::{RelayError, Result};
use crate::state::AppState;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub async fn proxy(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let request: RelayRequest = serde_json::from_slice(&body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid proxy request: {}", e)))?;
    validate(&request)?;

    let upstream = match request.provider {
        ProviderKind::Anthropic => state
            .client
            .post(format!("{}/v1/messages", state.config.anthropic_url()))
            .header("x-api-key", &request.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_body(&request)?),
        ProviderKind::OpenAi => state
            .client
            .post(format!("{}/v1/chat/completions", state.config.openai_url()))
            .bearer_auth(&request.api_key)
            .json(&openai_body(&request)?),
        ProviderKind::Ollama => return Err(local_not_proxied(request.provider)),
    };

    tracing::debug!(
        "Proxying {} request for model {}",
        request.provider,
        request.model
    );

    let response = upstream.send().await.map_err(|e| RelayError::Transport {
        details: e.to_string(),
        provider: Some(request.provider),
        model: Some(request.model.clone()),
    })?;

    let status = response.status();
    if !status.is_success() {
        let details = response.text().await.unwrap_or_default();
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            details,
            provider: request.provider,
            model: Some(request.model),
        });
    }

    let value = response.json::<Value>().await.map_err(|e| RelayError::Transport {
        details: format!("Invalid JSON from upstream: {}", e),
        provider: Some(request.provider),
        model: Some(request.model.clone()),
    })?;
    Ok(Json(value))
}

fn local_not_proxied(provider: ProviderKind) -> RelayError {
    RelayError::InvalidRequest(format!(
        "Provider {} is not proxied; call the local server directly",
        provider
    ))
}

fn validate(request: &RelayRequest) -> Result<()> {
    if request.provider.is_local() {
        return Err(local_not_proxied(request.provider));
    }
    if request.api_key.trim().is_empty() {
        return Err(RelayError::InvalidRequest("Missing API key".to_string()));
    }
    if request.model.trim().is_empty() {
        return Err(RelayError::InvalidRequest("Missing model".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(RelayError::InvalidRequest("Missing prompt".to_string()));
    }
    if request.max_tokens == 0 {
        return Err(RelayError::InvalidRequest(
            "maxTokens must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Messages API body. Attachments go before the prompt text.
pub fn anthropic_body(request: &RelayRequest) -> Result<Value> {
    let content = match &request.attachment {
        None => json!(request.prompt),
        Some(attachment) => {
            let block_type = match attachment_class(attachment)? {
                AttachmentClass::Pdf => "document",
                AttachmentClass::Image => "image",
            };
            json!([
                {
                    "type": block_type,
                    "source": {
                        "type": "base64",
                        "media_type": attachment.media_type,
                        "data": attachment.data,
                    }
                },
                {"type": "text", "text": request.prompt}
            ])
        }
    };

    Ok(json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [{"role": "user", "content": content}],
    }))
}

/// Chat Completions body. Attachments travel as data URLs.
pub fn openai_body(request: &RelayRequest) -> Result<Value> {
    let content = match &request.attachment {
        None => json!(request.prompt),
        Some(attachment) => {
            let data_url = format!("data:{};base64,{}", attachment.media_type, attachment.data);
            let part = match attachment_class(attachment)? {
                AttachmentClass::Image => json!({
                    "type": "image_url",
                    "image_url": {"url": data_url},
                }),
                AttachmentClass::Pdf => json!({
                    "type": "file",
                    "file": {
                        "filename": attachment.file_name.as_deref().unwrap_or("document.pdf"),
                        "file_data": data_url,
                    },
                }),
            };
            json!([part, {"type": "text", "text": request.prompt}])
        }
    };

    Ok(json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [{"role": "user", "content": content}],
    }))
}

enum AttachmentClass {
    Pdf,
    Image,
}

fn attachment_class(attachment: &Attachment) -> Result<AttachmentClass> {
    let media_type = attachment.media_type.to_lowercase();
    if media_type == "application/pdf" {
        Ok(AttachmentClass::Pdf)
    } else if media_type.starts_with("image/") {
        Ok(AttachmentClass::Image)
    } else {
        Err(RelayError::InvalidRequest(format!(
            "Unsupported attachment type {}; send text content inline",
            attachment.media_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(provider: ProviderKind, attachment: Option<Attachment>) -> RelayRequest {
        RelayRequest {
            provider,
            api_key: "key".to_string(),
            model: "model-1".to_string(),
            prompt: "Describe this".to_string(),
            max_tokens: 100,
            attachment,
        }
    }

    fn pdf() -> Attachment {
        Attachment {
            media_type: "application/pdf".to_string(),
            data: "JVBERi0=".to_string(),
            file_name: Some("spec.pdf".to_string()),
        }
    }

    #[test]
    fn test_anthropic_plain_prompt() {
        let body = anthropic_body(&request(ProviderKind::Anthropic, None)).unwrap();
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["content"], "Describe this");
    }

    #[test]
    fn test_anthropic_pdf_is_document_block() {
        let body = anthropic_body(&request(ProviderKind::Anthropic, Some(pdf()))).unwrap();
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "document");
        assert_eq!(content[0]["source"]["media_type"], "application/pdf");
        assert_eq!(content[1]["text"], "Describe this");
    }

    #[test]
    fn test_openai_pdf_is_file_part() {
        let body = openai_body(&request(ProviderKind::OpenAi, Some(pdf()))).unwrap();
        let part = &body["messages"][0]["content"][0];
        assert_eq!(part["type"], "file");
        assert_eq!(part["file"]["filename"], "spec.pdf");
        assert_eq!(part["file"]["file_data"], "data:application/pdf;base64,JVBERi0=");
    }

    #[test]
    fn test_text_attachment_rejected() {
        let attachment = Attachment {
            media_type: "text/plain".to_string(),
            data: "aGk=".to_string(),
            file_name: None,
        };
        assert!(matches!(
            openai_body(&request(ProviderKind::OpenAi, Some(attachment))),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_local_and_blank_fields() {
        assert!(validate(&request(ProviderKind::Ollama, None)).is_err());

        let mut blank_key = request(ProviderKind::OpenAi, None);
        blank_key.api_key = " ".to_string();
        assert!(matches!(
            validate(&blank_key),
            Err(RelayError::InvalidRequest(ref m)) if m == "Missing API key"
        ));

        assert!(validate(&request(ProviderKind::Anthropic, None)).is_ok());
    }
}

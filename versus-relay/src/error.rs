use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use versus::ai::relay::RelayErrorBody;
use versus::ai::ProviderKind;
use versus::StoreError;

pub type Result<T> = core::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{provider} request failed with status {status}")]
    Upstream {
        status: u16,
        details: String,
        provider: ProviderKind,
        model: Option<String>,
    },

    #[error("Could not reach {}", .provider.map(|p| p.display_name()).unwrap_or("upstream"))]
    Transport {
        details: String,
        provider: Option<ProviderKind>,
        model: Option<String>,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::Transport { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Store(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> RelayErrorBody {
        let (details, provider, model) = match self {
            RelayError::Upstream {
                details,
                provider,
                model,
                ..
            } => (Some(details.clone()), Some(*provider), model.clone()),
            RelayError::Transport {
                details,
                provider,
                model,
            } => (Some(details.clone()), *provider, model.clone()),
            _ => (None, None, None),
        };
        RelayErrorBody {
            error: self.to_string(),
            details,
            provider,
            model,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_passes_through() {
        let err = RelayError::Upstream {
            status: 429,
            details: "rate limited".to_string(),
            provider: ProviderKind::OpenAi,
            model: Some("gpt-4o".to_string()),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = err.body();
        assert_eq!(body.provider, Some(ProviderKind::OpenAi));
        assert_eq!(body.details.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_transport_is_bad_gateway() {
        let err = RelayError::Transport {
            details: "connection refused".to_string(),
            provider: Some(ProviderKind::Anthropic),
            model: None,
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Could not reach Claude (Anthropic)");
    }

    #[test]
    fn test_invalid_request_has_no_details() {
        let body = RelayError::InvalidRequest("Missing API key".to_string()).body();
        assert_eq!(body.error, "Missing API key");
        assert!(body.details.is_none());
    }
}

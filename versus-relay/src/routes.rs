//! Model listing, data mirror and health endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use versus::ai::ollama::list_local_models;
use versus::ai::relay::{ModelListRequest, ModelListResponse};
use versus::ai::{AIError, ProviderKind};
use versus::{Collection, Snapshot};

use crate::error::{RelayError, Result};
use crate::state::AppState;

/// `POST /api/ollama/models`
pub async fn list_models(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ModelListResponse>> {
    let request: ModelListRequest = serde_json::from_slice(&body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid model list request: {}", e)))?;
    if request.base_url.trim().is_empty() {
        return Err(RelayError::InvalidRequest("Missing baseUrl".to_string()));
    }

    match list_local_models(&state.client, request.base_url.trim()).await {
        Ok(list) => Ok(Json(list)),
        Err(AIError::ApiError { status, message }) => Err(RelayError::Upstream {
            status,
            details: message,
            provider: ProviderKind::Ollama,
            model: None,
        }),
        Err(e) => Err(RelayError::Transport {
            details: e.to_string(),
            provider: Some(ProviderKind::Ollama),
            model: None,
        }),
    }
}

/// `GET /api/data`
pub async fn read_data(State(state): State<AppState>) -> Result<Json<Snapshot>> {
    let store = state.store.clone();
    let snapshot = tokio::task::spawn_blocking(move || store.snapshot())
        .await
        .map_err(|e| RelayError::Internal(e.to_string()))??;
    Ok(Json(snapshot))
}

/// `POST /api/data`: each document present in the body replaces the stored one.
pub async fn write_data(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let update: Snapshot = serde_json::from_slice(&body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid data document: {}", e)))?;

    let store = state.store.clone();
    let written = tokio::task::spawn_blocking(move || store.apply(&update))
        .await
        .map_err(|e| RelayError::Internal(e.to_string()))??;

    let names: Vec<&str> = written.iter().map(Collection::file_name).collect();
    tracing::debug!("Mirrored {:?}", names);
    Ok(Json(json!({ "ok": true, "updated": names })))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

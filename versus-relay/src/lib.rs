//! Versus relay - the same-origin service between clients and cloud AI providers
//!
//! Exposes the AI proxy endpoint, local model listing and the persistence
//! mirror. Clients never talk to cloud providers directly.

pub mod config;
pub mod error;
pub mod proxy;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use versus::ai::relay::{DATA_PATH, MODELS_PATH, PROXY_PATH};

pub use config::Config;
pub use error::RelayError;
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PROXY_PATH, post(proxy::proxy))
        .route(MODELS_PATH, post(routes::list_models))
        .route(DATA_PATH, get(routes::read_data).post(routes::write_data))
        .route("/health", get(routes::health))
        .with_state(state)
}

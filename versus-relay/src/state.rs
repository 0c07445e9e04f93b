use std::sync::Arc;
use versus::{DocumentStore, StoreError};

use crate::config::Config;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: reqwest::Client,
    pub store: Arc<DocumentStore>,
}

impl AppState {
    /// Opens the data directory. The relay's own store never mirrors.
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let store = DocumentStore::open(&config.data_dir)?;
        Ok(Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
            store: Arc::new(store),
        })
    }
}

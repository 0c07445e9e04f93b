//! File-backed document storage.
//!
//! Each collection is one pretty-printed JSON document in the data
//! directory, replaced atomically on every write. A store can carry a
//! [`MirrorClient`]: after each local write the same document is pushed to the
//! relay's `/api/data` endpoint in the background. Mirror failures are logged
//! and otherwise ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::ai::registry::AiConfig;
use crate::ai::relay::DATA_PATH;
use crate::model::{Comparison, Contender};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid JSON in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Mirror request failed: {0}")]
    Mirror(#[from] reqwest::Error),
    #[error("Mirror returned status {0}")]
    MirrorStatus(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Comparisons,
    Contenders,
    AiConfig,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Comparisons,
        Collection::Contenders,
        Collection::AiConfig,
    ];

    /// File the collection is stored in
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Comparisons => "comparisons.json",
            Collection::Contenders => "contenders.json",
            Collection::AiConfig => "ai-config.json",
        }
    }
}

/// All documents, or any subset of them. `None` means "not included".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparisons: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenders: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config: Option<serde_json::Value>,
}

impl Snapshot {
    pub fn get(&self, collection: Collection) -> Option<&serde_json::Value> {
        match collection {
            Collection::Comparisons => self.comparisons.as_ref(),
            Collection::Contenders => self.contenders.as_ref(),
            Collection::AiConfig => self.ai_config.as_ref(),
        }
    }

    pub fn set(&mut self, collection: Collection, value: serde_json::Value) {
        match collection {
            Collection::Comparisons => self.comparisons = Some(value),
            Collection::Contenders => self.contenders = Some(value),
            Collection::AiConfig => self.ai_config = Some(value),
        }
    }

    /// Snapshot holding a single document
    pub fn only(collection: Collection, value: serde_json::Value) -> Self {
        let mut snapshot = Snapshot::default();
        snapshot.set(collection, value);
        snapshot
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    dir: PathBuf,
    mirror: Option<MirrorClient>,
}

impl DocumentStore {
    /// Open (creating if needed) a data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, mirror: None })
    }

    /// Mirror every write to the relay
    pub fn with_mirror(mut self, mirror: MirrorClient) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Raw document, or `None` if it was never written.
    pub fn read_raw(&self, collection: Collection) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path(collection);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json {
                file: collection.file_name().to_string(),
                source,
            })
    }

    /// Replace a document locally, then mirror it if a mirror is configured.
    pub fn write_raw(
        &self,
        collection: Collection,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            file: collection.file_name().to_string(),
            source,
        })?;
        write_atomic(&self.path(collection), &bytes)?;

        if let Some(mirror) = &self.mirror {
            mirror.push_in_background(Snapshot::only(collection, value.clone()));
        }
        Ok(())
    }

    /// Typed document, or the default when it was never written
    pub fn load<T: DeserializeOwned + Default>(&self, collection: Collection) -> Result<T, StoreError> {
        match self.read_raw(collection)? {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Json {
                file: collection.file_name().to_string(),
                source,
            }),
        }
    }

    pub fn save<T: Serialize>(&self, collection: Collection, document: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(document).map_err(|source| StoreError::Json {
            file: collection.file_name().to_string(),
            source,
        })?;
        self.write_raw(collection, &value)
    }

    /// Every stored document; collections never written are absent.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::default();
        for collection in Collection::ALL {
            if let Some(value) = self.read_raw(collection)? {
                snapshot.set(collection, value);
            }
        }
        Ok(snapshot)
    }

    /// Overwrite each document present in `update`. Returns what was written.
    pub fn apply(&self, update: &Snapshot) -> Result<Vec<Collection>, StoreError> {
        let mut written = Vec::new();
        for collection in Collection::ALL {
            if let Some(value) = update.get(collection) {
                self.write_raw(collection, value)?;
                written.push(collection);
            }
        }
        Ok(written)
    }

    pub fn comparisons(&self) -> Result<Vec<Comparison>, StoreError> {
        self.load(Collection::Comparisons)
    }

    pub fn comparison(&self, id: Uuid) -> Result<Option<Comparison>, StoreError> {
        Ok(self.comparisons()?.into_iter().find(|c| c.id == id))
    }

    /// Insert or replace by id.
    pub fn save_comparison(&self, comparison: &Comparison) -> Result<(), StoreError> {
        let mut all = self.comparisons()?;
        upsert_by(&mut all, comparison.clone(), |c| c.id == comparison.id);
        self.save(Collection::Comparisons, &all)
    }

    pub fn contenders(&self) -> Result<Vec<Contender>, StoreError> {
        self.load(Collection::Contenders)
    }

    pub fn contender(&self, id: Uuid) -> Result<Option<Contender>, StoreError> {
        Ok(self.contenders()?.into_iter().find(|c| c.id == id))
    }

    /// Contenders belonging to one comparison
    pub fn contenders_of(&self, comparison_id: Uuid) -> Result<Vec<Contender>, StoreError> {
        Ok(self
            .contenders()?
            .into_iter()
            .filter(|c| c.comparison_id == comparison_id)
            .collect())
    }

    /// Insert or replace by id.
    pub fn save_contender(&self, contender: &Contender) -> Result<(), StoreError> {
        let mut all = self.contenders()?;
        upsert_by(&mut all, contender.clone(), |c| c.id == contender.id);
        self.save(Collection::Contenders, &all)
    }

    pub fn ai_config(&self) -> Result<AiConfig, StoreError> {
        self.load(Collection::AiConfig)
    }

    pub fn save_ai_config(&self, config: &AiConfig) -> Result<(), StoreError> {
        self.save(Collection::AiConfig, config)
    }
}

fn upsert_by<T>(items: &mut Vec<T>, item: T, matches: impl Fn(&T) -> bool) {
    match items.iter().position(matches) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

/// Client for the relay's persistence mirror endpoint.
#[derive(Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    base_url: String,
}

impl MirrorClient {
    /// Create a mirror client for the relay at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), DATA_PATH)
    }

    /// Fetch every mirrored document
    pub async fn fetch(&self) -> Result<Snapshot, StoreError> {
        let response = self.client.get(self.url()).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::MirrorStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Push the documents in `update`; others are left alone
    pub async fn push(&self, update: &Snapshot) -> Result<(), StoreError> {
        let response = self.client.post(self.url()).json(update).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::MirrorStatus(response.status().as_u16()));
        }
        Ok(())
    }

    /// Fire-and-forget push. Needs a running tokio runtime; without one the
    /// push is skipped.
    pub fn push_in_background(&self, update: Snapshot) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; skipping mirror push");
            return;
        };
        let mirror = self.clone();
        handle.spawn(async move {
            if let Err(e) = mirror.push(&update).await {
                tracing::warn!("Mirror push to {} failed: {}", mirror.base_url, e);
            }
        });
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_tmp_path(dest: &Path) -> io::Result<PathBuf> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no filename"))?;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        ".{}.tmp.{}.{}.{}",
        file_name.to_string_lossy(),
        std::process::id(),
        now_ms,
        seq
    );
    Ok(parent.join(tmp_name))
}

/// Write to a sibling temp file, then rename over `dest`.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let tmp = unique_tmp_path(dest)?;
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyDefinition, PropertyType};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_documents_load_as_default() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        assert!(store.comparisons().unwrap().is_empty());
        assert_eq!(store.snapshot().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_save_comparison_upserts() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();

        let mut comparison = Comparison::new("Phones");
        store.save_comparison(&comparison).unwrap();
        comparison.add_property(PropertyDefinition::new("Price", PropertyType::Number));
        store.save_comparison(&comparison).unwrap();

        let all = store.comparisons().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].properties.len(), 1);
    }

    #[test]
    fn test_apply_overwrites_only_given_documents() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        store
            .write_raw(Collection::Comparisons, &json!([{"keep": true}]))
            .unwrap();

        let written = store
            .apply(&Snapshot::only(Collection::Contenders, json!([])))
            .unwrap();
        assert_eq!(written, vec![Collection::Contenders]);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.comparisons, Some(json!([{"keep": true}])));
        assert_eq!(snapshot.contenders, Some(json!([])));
        assert_eq!(snapshot.ai_config, None);
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("contenders.json"), b"{not json").unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        assert!(matches!(store.contenders(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("doc.json");
        write_atomic(&dest, b"[1]").unwrap();
        write_atomic(&dest, b"[2]").unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"[2]");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = Snapshot::only(Collection::AiConfig, json!({"providers": []}));
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({"aiConfig": {"providers": []}})
        );
    }

    #[tokio::test]
    async fn test_mirror_push_posts_partial_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/data")
            .match_body(mockito::Matcher::Json(json!({"contenders": []})))
            .with_status(200)
            .create_async()
            .await;

        let mirror = MirrorClient::new(server.url());
        mirror
            .push(&Snapshot::only(Collection::Contenders, json!([])))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mirror_push_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/data")
            .with_status(500)
            .create_async()
            .await;

        let mirror = MirrorClient::new(server.url());
        let err = mirror.push(&Snapshot::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::MirrorStatus(500)));
    }
}

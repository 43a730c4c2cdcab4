use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// One object as written to the staging store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Staging object storage consumed by corpus ingestion
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write (or overwrite) an object
    async fn put_object(&self, object: StoredObject) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>>;
}

/// Object store rooted at a local directory
///
/// Each object is a file at `<root>/<key>` with its content type and
/// metadata in a `<key>.meta.json` sidecar.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::InvalidArgument(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(".meta.json");
        PathBuf::from(sidecar)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_object(&self, object: StoredObject) -> Result<()> {
        let path = self.object_path(&object.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::ObjectStore(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        tokio::fs::write(&path, &object.body).await.map_err(|e| {
            AppError::ObjectStore(format!("Failed to write {}: {}", object.key, e))
        })?;

        let sidecar = serde_json::to_vec_pretty(&object)?;
        tokio::fs::write(Self::sidecar_path(&path), sidecar)
            .await
            .map_err(|e| {
                AppError::ObjectStore(format!("Failed to write metadata for {}: {}", object.key, e))
            })?;

        tracing::debug!(key = %object.key, bytes = object.body.len(), "Object written");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.object_path(key)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::ObjectStore(format!("Failed to read {}: {}", key, e))),
        };

        let mut object: StoredObject = match tokio::fs::read(Self::sidecar_path(&path)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => StoredObject {
                key: key.to_string(),
                body: Vec::new(),
                content_type: "application/octet-stream".to_string(),
                metadata: BTreeMap::new(),
            },
        };
        object.body = body;
        Ok(Some(object))
    }
}

/// Object store kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, object: StoredObject) -> Result<()> {
        self.objects.insert(object.key.clone(), object);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.get(key).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn object(key: &str) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            body: br#"{"ok":true}"#.to_vec(),
            content_type: "application/json".to_string(),
            metadata: BTreeMap::from([("source".to_string(), "batch-sync".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_filesystem_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemObjectStore::new(temp_dir.path());

        store
            .put_object(object("incidents/closed/INC-1.json"))
            .await
            .unwrap();

        let loaded = store
            .get_object("incidents/closed/INC-1.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, object("incidents/closed/INC-1.json"));
        assert!(temp_dir.path().join("incidents/closed/INC-1.json").exists());
        assert!(store.get_object("incidents/closed/none.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filesystem_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemObjectStore::new(temp_dir.path());

        let err = store.put_object(object("../outside.json")).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(store.put_object(object("/abs.json")).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_overwrites() {
        let store = InMemoryObjectStore::new();
        store.put_object(object("a.json")).await.unwrap();
        store.put_object(object("a.json")).await.unwrap();
        assert_eq!(store.keys(), vec!["a.json"]);
    }
}

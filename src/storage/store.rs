use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Durable object store that receives finished recordings
///
/// Implementations:
/// - `MemoryObjectStore`: in-process map (tests, embedding)
/// - `FsObjectStore`: files under a local root directory
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object
    async fn put(&self, key: &str, bytes: Vec<u8>, attributes: HashMap<String, String>)
        -> Result<()>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

/// Object held by [`MemoryObjectStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

/// In-memory object store
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<()> {
        debug!("Storing {} ({} bytes) in memory", key, bytes.len());
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), StoredObject { bytes, attributes });
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Object store backed by a local directory
///
/// Each object is written to `<root>/<key>`; its attributes go to a
/// `<key>.attributes.json` sidecar.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage root: {:?}", root))?;

        info!("Filesystem object store at {}", root.display());

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root, refusing absolute or parent components
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("Invalid object key: {:?}", key);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<()> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let size = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write object: {:?}", path))?;

        if !attributes.is_empty() {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(".attributes.json");
            let json = serde_json::to_vec_pretty(&attributes)?;
            tokio::fs::write(&sidecar, json)
                .await
                .with_context(|| format!("Failed to write attributes: {:?}", sidecar))?;
        }

        debug!("Wrote {} ({} bytes)", path.display(), size);
        Ok(())
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_get() -> Result<()> {
        let store = MemoryObjectStore::new();
        let mut attributes = HashMap::new();
        attributes.insert("content-type".to_string(), "audio/wav".to_string());

        store.put("recordings/a/b/c/inbound.wav", vec![1, 2, 3], attributes).await?;

        let object = store.get("recordings/a/b/c/inbound.wav").await.unwrap();
        assert_eq!(object.bytes, vec![1, 2, 3]);
        assert_eq!(object.attributes["content-type"], "audio/wav");
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_fs_store_writes_file_and_sidecar() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path())?;

        let mut attributes = HashMap::new();
        attributes.insert("call-id".to_string(), "CA1".to_string());
        store.put("recordings/p/e/ca1/metadata.json", b"{}".to_vec(), attributes).await?;

        let path = temp_dir.path().join("recordings/p/e/ca1/metadata.json");
        assert_eq!(std::fs::read(&path)?, b"{}");
        assert!(temp_dir
            .path()
            .join("recordings/p/e/ca1/metadata.json.attributes.json")
            .exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fs_store_rejects_traversal() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path())?;

        assert!(store.put("../escape.wav", vec![0], HashMap::new()).await.is_err());
        assert!(store.put("/abs.wav", vec![0], HashMap::new()).await.is_err());
        Ok(())
    }
}

//! Local fallback snapshots of namespace payloads.
//!
//! Layout: `{root}/{appId}/config-cache/{appId}+{cluster}+{namespace}.properties`,
//! where `root` defaults to `~/.apollo`. Files hold the exact bytes of the
//! last successful config fetch; the store never interprets them.

use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::{ClientError, ClientResult};

const CACHE_SUBDIR: &str = "config-cache";
const FILE_EXTENSION: &str = "properties";

/// Identity of one fallback record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FallbackKey {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
}

impl FallbackKey {
    pub fn new(
        app_id: impl Into<String>,
        cluster: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self { app_id: app_id.into(), cluster: cluster.into(), namespace: namespace.into() }
    }

    fn file_name(&self) -> String {
        format!("{}+{}+{}.{}", self.app_id, self.cluster, self.namespace, FILE_EXTENSION)
    }
}

/// Reads and writes fallback records under a root directory.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    root: PathBuf,
}

impl FallbackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic location of a record.
    pub fn path_for(&self, key: &FallbackKey) -> PathBuf {
        self.root.join(&key.app_id).join(CACHE_SUBDIR).join(key.file_name())
    }

    /// Persist raw payload bytes, creating directories as needed.
    ///
    /// Written to a temp file and renamed, so readers never see a torn record.
    pub async fn save(&self, key: &FallbackKey, bytes: &[u8]) -> ClientResult<()> {
        let path = self.path_for(key);
        let unavailable = |source| ClientError::FallbackUnavailable { path: path.clone(), source };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(unavailable)?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", FILE_EXTENSION));
        tokio::fs::write(&temp_path, bytes).await.map_err(unavailable)?;
        tokio::fs::rename(&temp_path, &path).await.map_err(unavailable)?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Fallback snapshot saved");
        Ok(())
    }

    /// Raw bytes of the last saved record.
    pub async fn load(&self, key: &FallbackKey) -> ClientResult<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ClientError::FallbackNotFound { path }),
            Err(source) => Err(ClientError::FallbackUnavailable { path, source }),
        }
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{KeyValueStore, StoreError};

/// File extension for stored values.
const VALUE_EXT: &str = "kv";

/// File-backed store: one file per key under a dedicated directory.
///
/// Keys map directly to file names, so they must stay within the
/// `[A-Za-z0-9_.-]` alphabet every cache key in this crate already uses.
/// Anything else is rejected rather than silently escaped.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(StoreError::Unavailable(format!(
                "key {key:?} is not a valid file-backed store key"
            )));
        }
        Ok(self.dir.join(format!("{key}.{VALUE_EXT}")))
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != VALUE_EXT {
            return None;
        }
        Some(path.file_stem()?.to_str()?.to_string())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        match fs::write(&path, value).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::StorageFull => {
                Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = Self::key_from_path(&entry.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("kn_cache_attendees", "[1,2]").await.unwrap();
        store.set("conference_auth", "{}").await.unwrap();

        assert_eq!(
            store.get("kn_cache_attendees").await.unwrap(),
            Some("[1,2]".to_string())
        );

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["conference_auth", "kn_cache_attendees"]);

        store.remove("conference_auth").await.unwrap();
        assert_eq!(store.get("conference_auth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert!(store.set("../escape", "x").await.is_err());
        assert!(store.get("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }
}

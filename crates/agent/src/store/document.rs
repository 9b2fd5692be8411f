//! Single JSON document on disk with serialized read-modify-write.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use loglens_core::error::StoreError;

/// One persisted JSON document.
///
/// Every access goes through an async mutex so concurrent monitor tasks
/// updating different keys of the same file never lose each other's
/// writes. A missing or empty file reads as `T::default()`.
pub struct JsonDocument<T> {
    path: PathBuf,
    name: String,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Document at `dir/file_name`. Nothing is touched on disk until first write.
    pub fn new(dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: dir.as_ref().join(file_name),
            name: file_name.to_owned(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current value.
    pub async fn load(&self) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Replaces the whole document.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(value).await
    }

    /// Read-modify-write as one critical section.
    ///
    /// The closure's return value is passed through; the document is
    /// written back even if the closure left it unchanged.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut value = self.read_unlocked().await?;
        let result = f(&mut value);
        self.write_unlocked(&value).await?;
        Ok(result)
    }

    /// Read-modify-write that only writes when the closure reports a change.
    pub async fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut value = self.read_unlocked().await?;
        let changed = f(&mut value);
        if changed {
            self.write_unlocked(&value).await?;
        }
        Ok(changed)
    }

    async fn read_unlocked(&self) -> Result<T, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(StoreError::Io {
                    document: self.name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            document: self.name.clone(),
            reason: e.to_string(),
        })
    }

    async fn write_unlocked(&self, value: &T) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            document: self.name.clone(),
            reason: e.to_string(),
        };

        let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Corrupt {
            document: self.name.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // write-then-rename so readers never observe a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

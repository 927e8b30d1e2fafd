//! Key/value persistence for registry state.
//!
//! The store holds a handful of short string values (the selected interactor
//! and the recent-address list). [`FileAddressStore`] keeps them in one JSON
//! object on disk and rewrites it atomically on every change.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::trace;

/// Maximum state file size accepted on read (64 KiB).
const MAX_STATE_FILE_SIZE: u64 = 64 * 1024;

/// Errors raised by an [`AddressStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("state file {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a JSON object of strings.
    #[error("state file {path} is corrupt: {message}")]
    Corrupt {
        /// The file involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// String key/value persistence, the analogue of browser local storage.
pub trait AddressStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store, used by tests and one-shot invocations.
#[derive(Debug, Default)]
pub struct MemoryAddressStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryAddressStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AddressStore for MemoryAddressStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values().remove(key);
        Ok(())
    }
}

/// JSON-file store with atomic replace-on-write.
///
/// Writes go to a `NamedTempFile` in the same directory, are fsynced, then
/// renamed over the state file, so a crash never leaves a torn file behind.
#[derive(Debug)]
pub struct FileAddressStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAddressStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            },
            Err(error) => return Err(StoreError::io(&self.path, error)),
        };
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                message: format!("{} bytes exceeds {MAX_STATE_FILE_SIZE}", metadata.len()),
            });
        }

        let content = fs::read(&self.path).map_err(|error| StoreError::io(&self.path, error))?;
        serde_json::from_slice(&content).map_err(|error| StoreError::Corrupt {
            path: self.path.clone(),
            message: error.to_string(),
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|error| StoreError::io(&dir, error))?;

        let bytes = serde_json::to_vec_pretty(values).map_err(|error| StoreError::Corrupt {
            path: self.path.clone(),
            message: error.to_string(),
        })?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|error| StoreError::io(&dir, error))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|error| StoreError::io(temp.path(), error))?;
        }

        temp.as_file_mut()
            .write_all(&bytes)
            .map_err(|error| StoreError::io(temp.path(), error))?;
        temp.as_file()
            .sync_all()
            .map_err(|error| StoreError::io(temp.path(), error))?;
        temp.persist(&self.path)
            .map_err(|error| StoreError::io(&self.path, error.error))?;

        trace!(path = %self.path.display(), keys = values.len(), "wrote state file");
        Ok(())
    }

    fn update(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        if mutate(&mut values) {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

impl AddressStore for FileAddressStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|values| values.remove(key).is_some())
    }
}

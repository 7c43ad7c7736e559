//! Persistent session storage
//!
//! A session is stored as three string keys (`user`, `authToken`,
//! `refreshToken`). Backends write and clear them as one unit.

use crate::config::SessionKeys;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt session record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// The raw persisted keys. `user` holds the profile as a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredSession {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.auth_token.is_none() && self.refresh_token.is_none()
    }

    /// User and access token are both present
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.auth_token.is_some()
    }

    /// Value stored under one of [`SessionKeys`]
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            SessionKeys::USER => self.user.as_deref(),
            SessionKeys::AUTH_TOKEN => self.auth_token.as_deref(),
            SessionKeys::REFRESH_TOKEN => self.refresh_token.as_deref(),
            _ => None,
        }
    }
}

/// Where the session survives restarts
pub trait SessionStorage: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<StoredSession, StorageError>;

    /// Replace every key at once
    fn save(&self, record: &StoredSession) -> Result<(), StorageError>;

    /// Remove every key at once
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: Mutex<StoredSession>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record
    pub fn with_record(record: StoredSession) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<StoredSession, StorageError> {
        Ok(self.record.lock().map_err(|_| StorageError::Poisoned)?.clone())
    }

    fn save(&self, record: &StoredSession) -> Result<(), StorageError> {
        *self.record.lock().map_err(|_| StorageError::Poisoned)? = record.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.record.lock().map_err(|_| StorageError::Poisoned)? = StoredSession::default();
        Ok(())
    }
}

/// JSON file holding the three keys.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader sees either the old record or the new one.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        {
            let mut options = std::fs::OpenOptions::new();
            options.create(true).write(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&temp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<StoredSession, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(StoredSession::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, record: &StoredSession) -> Result<(), StorageError> {
        let content = serde_json::to_vec_pretty(record)?;
        self.write_atomic(&content)
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

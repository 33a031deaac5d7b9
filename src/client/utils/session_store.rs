use keyring::Entry;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::common::error::{ClientError, Result};
use crate::common::models::TokenPair;

const SERVICE: &str = "quickassist";
/// The one well-known key the serialized token pair lives under.
pub const TOKENS_KEY: &str = "authTokens";

/// Durable home of the token pair. Nothing else about the session is persisted.
pub trait TokenPersistence: Send + Sync {
    fn save(&self, tokens: &TokenPair) -> Result<()>;
    fn load(&self) -> Option<TokenPair>;
    fn clear(&self) -> Result<()>;
}

/// OS keyring, with an optional plain file used only when explicitly allowed.
pub struct KeyringStore {
    fallback: Option<FileStore>,
}

impl KeyringStore {
    pub fn new(fallback_file: Option<PathBuf>) -> Self {
        Self { fallback: fallback_file.map(FileStore::new) }
    }

    fn entry() -> Entry {
        Entry::new(SERVICE, TOKENS_KEY)
    }
}

impl TokenPersistence for KeyringStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        let raw = serde_json::to_string(tokens)?;
        match Self::entry().set_password(&raw) {
            Ok(()) => Ok(()),
            Err(e) => match &self.fallback {
                Some(file) => {
                    // never log the token itself
                    warn!("Keyring unavailable ({}), persisting session to {}", e, file.path().display());
                    file.save(tokens)
                }
                None => Err(ClientError::Storage("keyring unavailable and file fallback disabled".to_string())),
            },
        }
    }

    fn load(&self) -> Option<TokenPair> {
        match Self::entry().get_password() {
            Ok(raw) if !raw.trim().is_empty() => match serde_json::from_str(&raw) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    warn!("Discarding unreadable stored session: {}", e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                debug!("No session in keyring: {}", e);
                self.fallback.as_ref().and_then(|f| f.load())
            }
        }
    }

    fn clear(&self) -> Result<()> {
        let _ = Self::entry().delete_password();
        if let Some(file) = &self.fallback {
            file.clear()?;
        }
        Ok(())
    }
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenPersistence for FileStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Storage(e.to_string()))?;
        }
        let raw = serde_json::to_string(tokens)?;
        std::fs::write(&self.path, raw).map_err(|e| ClientError::Storage(e.to_string()))
    }

    fn load(&self) -> Option<TokenPair> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        serde_json::from_str(raw.trim()).ok()
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| ClientError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

/// Keeps the session for the life of the process only.
#[derive(Default)]
pub struct MemoryStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl TokenPersistence for MemoryStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        let mut guard = self.tokens.lock().map_err(|_| ClientError::Storage("session lock poisoned".to_string()))?;
        *guard = Some(tokens.clone());
        Ok(())
    }

    fn load(&self) -> Option<TokenPair> {
        self.tokens.lock().ok().and_then(|g| g.clone())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut guard) = self.tokens.lock() {
            *guard = None;
        }
        Ok(())
    }
}

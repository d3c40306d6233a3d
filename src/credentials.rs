use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{GenError, Result};

/// Prefix every Hugging Face access token carries.
pub const API_KEY_PREFIX: &str = "hf_";

/// Holder of the inference API key, shared by every in-flight item of a batch.
///
/// `clear` may be called concurrently by several items that were all rejected
/// with the same key, so implementations must treat it as idempotent.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, key: String) -> Result<()>;
    fn clear(&self);
}

/// Trims the key and checks the provider prefix.
pub fn validate_api_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.len() > API_KEY_PREFIX.len() && key.starts_with(API_KEY_PREFIX) {
        Ok(key.to_string())
    } else {
        Err(GenError::ValidationError(format!(
            "Please enter a valid Hugging Face API key (should start with {})",
            API_KEY_PREFIX
        )))
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a key. The key is still checked for the provider prefix.
    pub fn with_key(key: impl AsRef<str>) -> Result<Self> {
        let key = validate_api_key(key.as_ref())?;
        Ok(Self {
            key: RwLock::new(Some(key)),
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, key: String) -> Result<()> {
        let key = validate_api_key(&key)?;
        *self
            .key
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(key);
        Ok(())
    }

    fn clear(&self) {
        *self
            .key
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Keeps the key in a small text file so it survives restarts.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileCredentialStore {
    /// Opens the store, loading a previously saved key if the file exists.
    /// A file holding a malformed key is ignored.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cached = match fs::read_to_string(&path) {
            Ok(contents) => match validate_api_key(&contents) {
                Ok(key) => Some(key),
                Err(_) => {
                    log::warn!("Ignoring malformed API key in {}", path.display());
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, key: String) -> Result<()> {
        let key = validate_api_key(&key)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &key)?;
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(key);
        log::info!("API key saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) {
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        match fs::remove_file(&self.path) {
            Ok(()) => log::info!("Removed stored API key {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

//! Durable credential store
//!
//! A single JSON file holds one credential per provider and is the source of
//! truth across restarts. Every save rewrites the whole file through a
//! temporary sibling that is flushed and renamed over the original, so a crash
//! mid-write leaves either the previous or the new contents on disk.
//!
//! Entries are never removed by the application; deleting the file (or an
//! entry in it) is how an operator forces a fresh login.

use crate::credential::{Credential, Provider};
use crate::error::{LadningError, Result};
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CACHE_FORMAT_VERSION: u32 = 1;

/// On-disk layout of the cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    pub credentials: BTreeMap<Provider, Credential>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            credentials: BTreeMap::new(),
        }
    }
}

/// Decode raw cache file contents, rejecting unknown format versions
pub fn decode_cache_file(bytes: &[u8]) -> Result<CacheFile> {
    let file: CacheFile = serde_json::from_slice(bytes)
        .map_err(|e| LadningError::storage(format!("Malformed token cache: {}", e)))?;
    if file.version != CACHE_FORMAT_VERSION {
        return Err(LadningError::storage(format!(
            "Unsupported token cache version {}",
            file.version
        )));
    }
    Ok(file)
}

/// File-backed credential store shared by all auth sessions
pub struct TokenCache {
    path: PathBuf,
    // Serializes read-modify-write cycles of different providers
    write_lock: Mutex<()>,
    logger: StructuredLogger,
}

impl TokenCache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            logger: get_logger("token_cache"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the credential stored for `provider`.
    ///
    /// A missing file or entry is `Ok(None)`; an unreadable or malformed file
    /// is a `Storage` error, which callers treat exactly like `None`.
    pub fn load(&self, provider: Provider) -> Result<Option<Credential>> {
        let file = self.read_file()?;
        Ok(file.credentials.get(&provider).cloned())
    }

    /// Persist `credential` as the entry for `provider`
    pub fn save(&self, provider: Provider, credential: &Credential) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LadningError::storage("Token cache lock poisoned"))?;

        let mut file = match self.read_file() {
            Ok(file) => file,
            Err(e) => {
                self.logger
                    .warn(&format!("Replacing unreadable token cache: {}", e));
                CacheFile::default()
            }
        };
        file.credentials.insert(provider, credential.clone());

        let contents = serde_json::to_vec_pretty(&file)?;
        self.write_atomic(&contents)?;
        self.logger.debug(&format!(
            "Saved {} credential to {}",
            provider,
            self.path.display()
        ));
        Ok(())
    }

    fn read_file(&self) -> Result<CacheFile> {
        match std::fs::read(&self.path) {
            Ok(bytes) => decode_cache_file(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheFile::default()),
            Err(e) => Err(LadningError::storage(format!(
                "Cannot read token cache {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "tokens".to_string());
        self.path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name,
            uuid::Uuid::new_v4().simple()
        ))
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LadningError::storage(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let temp_path = self.temp_path();
        let result = (|| -> std::io::Result<()> {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut temp = options.open(&temp_path)?;
            temp.write_all(contents)?;
            temp.sync_all()?;
            std::fs::rename(&temp_path, &self.path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(LadningError::storage(format!(
                "Cannot write token cache {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }
}

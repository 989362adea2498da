use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{is_valid_key, key_ref, parse_key_ref, ObjectStore, DEFAULT_RETRIES};
use crate::error::{GalaxyError, Result};
use crate::logging::operations;

pub const SCHEME: &str = "fs";

/// Filesystem-backed object store
///
/// Layout: `<root>/objects/<key>`, keys map one-to-one onto relative paths.
/// Writes go to a temp file next to the destination and are renamed into
/// place, so concurrent writers of the same key never expose partial objects.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    objects_dir: PathBuf,
    retries: u32,
    backoff: Duration,
}

impl FilesystemStore {
    /// Create a store rooted at `root`; `retries` is the number of write attempts
    pub fn new<P: AsRef<Path>>(root: P, retries: u32) -> Self {
        Self {
            objects_dir: root.as_ref().join("objects"),
            retries: retries.max(1),
            backoff: Duration::from_millis(50),
        }
    }

    pub fn with_default_retries<P: AsRef<Path>>(root: P) -> Self {
        Self::new(root, DEFAULT_RETRIES)
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.objects_dir.clone(), |path, segment| path.join(segment))
    }

    /// Resolve a key ref of this store to its object path
    fn resolve(&self, key_ref: &str) -> Result<PathBuf> {
        match parse_key_ref(key_ref) {
            Some((SCHEME, key)) if is_valid_key(key) => Ok(self.key_to_path(key)),
            _ => Err(GalaxyError::NotFound(format!(
                "'{}' is not a key of this store",
                key_ref
            ))),
        }
    }

    fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "object path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        // PID + thread ID keep concurrent writers of the same key apart
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = parent.join(format!(
            ".{}.tmp.{}.{:?}",
            file_name,
            std::process::id(),
            thread::current().id()
        ));

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    }
}

impl ObjectStore for FilesystemStore {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        if !is_valid_key(key) {
            return Err(GalaxyError::Upload {
                key: key.to_string(),
                attempts: 0,
                reason: "invalid object key".to_string(),
            });
        }

        let path = self.key_to_path(key);
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            match Self::write_atomic(&path, data) {
                Ok(()) => {
                    debug!(
                        operation = operations::STORE_PUT,
                        key = key,
                        size = data.len(),
                        attempt = attempt,
                        "stored object"
                    );
                    return Ok(key_ref(SCHEME, key));
                }
                Err(e) => {
                    warn!(
                        operation = operations::STORE_PUT,
                        key = key,
                        attempt = attempt,
                        error = %e,
                        "failed to store object"
                    );
                    last_error = e.to_string();
                    if attempt < self.retries {
                        thread::sleep(self.backoff * attempt);
                    }
                }
            }
        }

        Err(GalaxyError::Upload {
            key: key.to_string(),
            attempts: self.retries,
            reason: last_error,
        })
    }

    fn get(&self, key_ref: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key_ref)?;
        if !path.is_file() {
            return Err(GalaxyError::NotFound(key_ref.to_string()));
        }
        Ok(fs::read(&path)?)
    }

    fn exists(&self, key_ref: &str) -> Result<bool> {
        match self.resolve(key_ref) {
            Ok(path) => Ok(path.is_file()),
            Err(_) => Ok(false),
        }
    }
}

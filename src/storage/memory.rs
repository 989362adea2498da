use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{is_valid_key, key_ref, parse_key_ref, ObjectStore};
use crate::error::{GalaxyError, Result};

pub const SCHEME: &str = "mem";

/// In-memory object store
///
/// Counts writes and can be switched into a failing mode, which makes it the
/// store of choice for tests of the cache and the step instantiator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn key_of<'a>(&self, key_ref: &'a str) -> Option<&'a str> {
        match parse_key_ref(key_ref) {
            Some((SCHEME, key)) => Some(key),
            _ => None,
        }
    }
}

impl ObjectStore for MemoryStore {
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
        if self.failing.load(Ordering::SeqCst) {
            return Err(GalaxyError::Upload {
                key: key.to_string(),
                attempts: 1,
                reason: "store is unavailable".to_string(),
            });
        }

        let mut objects = self.objects.lock().map_err(|_| GalaxyError::Upload {
            key: key.to_string(),
            attempts: 1,
            reason: "store lock poisoned".to_string(),
        })?;
        objects.insert(key.to_string(), data.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(key_ref(SCHEME, key))
    }

    fn get(&self, key_ref: &str) -> Result<Vec<u8>> {
        let key = self
            .key_of(key_ref)
            .ok_or_else(|| GalaxyError::NotFound(key_ref.to_string()))?;
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
            .ok_or_else(|| GalaxyError::NotFound(key_ref.to_string()))
    }

    fn exists(&self, key_ref: &str) -> Result<bool> {
        Ok(match self.key_of(key_ref) {
            Some(key) => self
                .objects
                .lock()
                .map(|objects| objects.contains_key(key))
                .unwrap_or(false),
            None => false,
        })
    }
}

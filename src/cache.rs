/// Content-addressed upload cache
///
/// Memoizes uploads by content hash for one workflow builder session. The
/// first request for a hash uploads the content to `<namespace>/<hash>`; every
/// later request returns the recorded key ref without touching the store.
/// Entries are never invalidated within a session.
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::logging::operations;
use crate::storage::{join_key, ObjectStore};

/// SHA256 (hex) of a byte slice
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub struct ContentCache {
    store: Arc<dyn ObjectStore>,
    entries: HashMap<String, String>,
    uploads: usize,
    hits: usize,
}

impl ContentCache {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            entries: HashMap::new(),
            uploads: 0,
            hits: 0,
        }
    }

    /// Return the key ref for `hash`, uploading `content` on first use
    pub fn get_or_upload(&mut self, content: &[u8], hash: &str, namespace: &str) -> Result<String> {
        let key = join_key(&[namespace, hash]);

        if let Some(key_ref) = self.entries.get(&key) {
            self.hits += 1;
            debug!(
                operation = operations::CACHE_HIT,
                key = %key,
                "content already uploaded"
            );
            return Ok(key_ref.clone());
        }

        let key_ref = self.store.put(&key, content)?;
        self.uploads += 1;
        debug!(
            operation = operations::CACHE_UPLOAD,
            key = %key,
            size = content.len(),
            "uploaded content"
        );

        self.entries.insert(key, key_ref.clone());
        Ok(key_ref)
    }

    /// Hash `content` and upload it on first use
    pub fn put_content(&mut self, content: &[u8], namespace: &str) -> Result<String> {
        let hash = content_hash(content);
        self.get_or_upload(content, &hash, namespace)
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

//! Object store clients
//!
//! Artifacts and second-stage scripts are stored under hierarchical keys
//! (`namespace/build-in/stage-two/<hash>`). A store hands back a key ref of the
//! form `scheme://key`; the scheme prefix is what distinguishes stored objects
//! from plain filesystem paths.

pub mod archive;
pub mod cache_dir;
pub mod filesystem;
pub mod memory;

pub use cache_dir::default_store_dir;
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// Number of write attempts before an upload is reported as failed
pub const DEFAULT_RETRIES: u32 = 3;

/// Hierarchical key/value object store
pub trait ObjectStore: Send + Sync {
    /// Scheme used in key refs produced by this store (`fs`, `mem`)
    fn scheme(&self) -> &str;

    /// Store `data` under `key`, overwriting any previous object, and return its key ref
    fn put(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Retrieve the object behind a key ref
    fn get(&self, key_ref: &str) -> Result<Vec<u8>>;

    fn exists(&self, key_ref: &str) -> Result<bool>;
}

/// Build a key ref from a scheme and a key
pub fn key_ref(scheme: &str, key: &str) -> String {
    format!("{}://{}", scheme, key)
}

/// Split a key ref into scheme and key
pub fn parse_key_ref(key_ref: &str) -> Option<(&str, &str)> {
    let (scheme, key) = key_ref.split_once("://")?;
    let valid_scheme = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
    if !valid_scheme || key.is_empty() {
        return None;
    }
    Some((scheme, key))
}

/// Whether a string refers to a stored object rather than a local path
pub fn is_store_ref(s: &str) -> bool {
    parse_key_ref(s).is_some()
}

/// Join key segments, dropping empty segments and stray separators
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Keys must be relative and must not escape the store root
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

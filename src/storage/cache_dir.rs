use std::path::PathBuf;

/// Get default object store directory following XDG conventions
///
/// - Linux/Unix: $XDG_CACHE_HOME/galaxy/store or ~/.cache/galaxy/store
/// - macOS: ~/Library/Caches/galaxy/store
/// - Windows: %LOCALAPPDATA%/galaxy/store
pub fn default_store_dir() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("galaxy").join("store")
    } else {
        // Fallback to current directory if we can't determine cache dir
        PathBuf::from(".galaxy/store")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_dir() {
        let store_dir = default_store_dir();
        assert!(store_dir.to_string_lossy().contains("galaxy"));
        assert!(store_dir.ends_with("store"));
    }
}

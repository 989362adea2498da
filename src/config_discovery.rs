use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::GalaxyConfig;

pub const CONFIG_FILE_NAME: &str = "galaxy.toml";

/// Discovers galaxy configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        // Try to go up one level
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("galaxy/config.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd.
///
/// Returns Ok(None) if no config is found (neither explicit nor discovered).
pub fn load_config_with_discovery(explicit_path: Option<&Path>) -> Result<Option<GalaxyConfig>> {
    if let Some(config_path) = explicit_path {
        return Ok(Some(GalaxyConfig::from_file(config_path)?));
    }

    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;

    match discover_config(&current_dir)? {
        Some(discovered_path) => {
            tracing::debug!(path = %discovered_path.display(), "discovered config");
            Ok(Some(GalaxyConfig::from_file(&discovered_path)?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        // Create nested structure
        let project = root.join("project");
        let subdir = project.join("subdir");
        fs::create_dir_all(&subdir).unwrap();

        // Create config in project root
        let config_path = project.join(CONFIG_FILE_NAME);
        fs::write(&config_path, "# test config").unwrap();

        let discovered = discover_config(&subdir).unwrap();
        assert_eq!(discovered, Some(config_path));
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("custom.toml");
        fs::write(&config_path, "[workflow]\nname = \"custom\"\n").unwrap();

        let config = load_config_with_discovery(Some(&config_path))
            .unwrap()
            .unwrap();
        assert_eq!(config.workflow.name, "custom");
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        assert!(load_config_with_discovery(Some(&temp.path().join("missing.toml"))).is_err());
    }
}

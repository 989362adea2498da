// Common test utilities shared across acceptance tests
//
// Every test gets its own workspace: a temp directory used as the current
// directory of the binary, with the store and the step working directories
// inside it. Nothing is written under the user's cache or config directories.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestWorkspace {
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.path().join("store")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    /// The galaxy binary, isolated to this workspace
    pub fn galaxy(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_galaxy"));
        cmd.current_dir(self.path())
            .env("GALAXY_STORE_DIR", self.store_dir())
            .env("GALAXY_WORK_DIR", self.work_dir())
            .env("RUST_LOG", "warn")
            .env_remove("GALAXY_CONFIG")
            .env_remove("GALAXY_RUNNER");
        cmd
    }

    pub fn create_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&file_path, content).unwrap();
        file_path
    }

    pub fn read_file(&self, path: &str) -> String {
        fs::read_to_string(self.path().join(path)).unwrap()
    }

    pub fn assert_file_exists(&self, path: &str) {
        let file_path = self.path().join(path);
        assert!(file_path.exists(), "File should exist: {}", path);
    }
}

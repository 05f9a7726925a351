//! Common test utilities for integration tests.

pub mod fixtures;

use std::path::PathBuf;
use tempfile::TempDir;

// Re-export common types
pub use fixtures::*;

/// Test environment holding a temporary output directory.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub output_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        Self {
            temp_dir,
            output_dir,
        }
    }

    /// Path of a file inside the output directory.
    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::TestStore;
//! ```

use namedex::feed::RemoteRecord;
use namedex::store::{DiffOp, Store};
use tempfile::TempDir;

/// Test store with automatic cleanup
///
/// Wraps a `Store` with its backing `TempDir`, ensuring the directory
/// lives as long as the store is in use.
pub struct TestStore {
    /// The store instance
    pub store: Store,
    /// Temp directory (kept alive to prevent cleanup)
    _dir: TempDir,
}

impl TestStore {
    /// Create an initialized test store in a temporary directory
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("names.db");
        let store = Store::open(&db_path).expect("Failed to open store");
        Self { store, _dir: dir }
    }

    /// Seed the store with (name, raw value) pairs in one batch
    pub fn seed(&self, entries: &[(&str, &str)]) {
        let plan: Vec<DiffOp> = entries
            .iter()
            .map(|(name, value)| DiffOp::Put(name.to_string(), value.to_string()))
            .collect();
        self.store.apply_batch(&plan).expect("Failed to seed store");
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Create a remote record with sensible defaults
#[allow(dead_code)]
pub fn record(name: &str, description: Option<&str>) -> RemoteRecord {
    RemoteRecord {
        name: name.to_string(),
        description: description.map(str::to_string),
    }
}

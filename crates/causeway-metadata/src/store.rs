//! In-memory filename -> manifest store for one metadata node (spec.md §4.4).
//!
//! One mutex, held only across the map operation itself — never during
//! network I/O — matching the discipline spec.md §5 requires and the one
//! `causeway_storage::store::StorageStore` already follows.

use std::collections::HashMap;
use std::sync::Mutex;

use causeway_core::manifest::FileManifest;

#[derive(Default)]
pub struct ManifestStore {
    inner: Mutex<HashMap<String, FileManifest>>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, filename: String, manifest: FileManifest) {
        self.inner.lock().unwrap().insert(filename, manifest);
    }

    pub fn get(&self, filename: &str) -> Option<FileManifest> {
        self.inner.lock().unwrap().get(filename).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

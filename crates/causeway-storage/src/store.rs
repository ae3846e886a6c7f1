//! In-memory chunk store — digest -> bytes.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use causeway_core::digest::HexDigest;

/// The storage node's key-value store.
///
/// A single mutex held only across the map operation itself, never while
/// bytes are sent or received over a socket, per spec.md §4.3/§5.
#[derive(Default)]
pub struct StorageStore {
    map: Mutex<HashMap<HexDigest, Bytes>>,
}

impl StorageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `digest -> bytes`. Idempotent: storing the same `(digest,
    /// bytes)` pair twice leaves the same post-state as storing it once.
    /// On a digest collision with different bytes (content hash assumed
    /// never to collide, per spec.md §4.3) the last write wins.
    pub fn put(&self, digest: HexDigest, bytes: Bytes) {
        self.map.lock().unwrap().insert(digest, bytes);
    }

    pub fn get(&self, digest: &HexDigest) -> Option<Bytes> {
        self.map.lock().unwrap().get(digest).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

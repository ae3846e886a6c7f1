//! Consistent-hash ring for chunk placement.
//!
//! The position hash (`hash_position`) is deliberately the weak 32-bit
//! accumulator from the original implementation, preserved for placement
//! reproducibility (spec.md §4.2, §9) rather than replaced with something
//! stronger. It is *not* used for content digests — see [`crate::digest`].

use std::collections::BTreeMap;

/// Replication factor the client uses for chunk placement.
pub const DEFAULT_REPLICATION: usize = 2;

/// The ring's 32-bit position hash: `h := 31*h + byte`, wrapping on overflow
/// exactly as signed 32-bit arithmetic would. Load-bearing for
/// interoperability between independent implementations — do not change.
pub fn hash_position(key: &str) -> i32 {
    let mut h: i32 = 0;
    for byte in key.bytes() {
        h = h.wrapping_mul(31).wrapping_add(byte as i32);
    }
    h
}

/// Errors mutating ring membership.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// spec.md §9 Open Questions: two addresses hashed to the same
    /// position. The original silently let the second overwrite the
    /// first; this implementation rejects it instead, since silent
    /// overwrite would quietly drop a storage node from the ring.
    #[error("address {new} hashes to the same ring position as existing member {existing}")]
    PositionCollision { existing: String, new: String },
}

/// A deterministic placement structure: keyspace position -> node address.
///
/// Ordered by position (`BTreeMap`) so `lookup` can find the ceiling
/// position and walk forward with wraparound in O(log n + k).
#[derive(Debug, Clone, Default)]
pub struct Ring {
    entries: BTreeMap<i32, String>,
}

impl Ring {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a ring from an ordered address list, inserted in that order.
    pub fn from_addresses<I, S>(addresses: I) -> Result<Self, RingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new();
        for addr in addresses {
            ring.add(addr.into())?;
        }
        Ok(ring)
    }

    /// Insert `(hash(address), address)`. Rejects a position collision
    /// rather than silently overwriting (see [`RingError::PositionCollision`]).
    pub fn add(&mut self, address: String) -> Result<(), RingError> {
        let position = hash_position(&address);
        if let Some(existing) = self.entries.get(&position) {
            if existing != &address {
                return Err(RingError::PositionCollision {
                    existing: existing.clone(),
                    new: address,
                });
            }
            return Ok(()); // identical address re-added: no-op, not a collision
        }
        self.entries.insert(position, address);
        Ok(())
    }

    /// Remove the entry for `address`, if present.
    pub fn remove(&mut self, address: &str) {
        let position = hash_position(address);
        self.entries.remove(&position);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Up to `k` distinct replica addresses for `key`, in ring order
    /// starting from the smallest position >= `hash(key)` (wrapping to the
    /// lowest position if none exists). Returns fewer than `k` if fewer
    /// unique addresses exist.
    pub fn lookup(&self, key: &str, k: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(k);
        if self.entries.is_empty() || k == 0 {
            return out;
        }

        let position = hash_position(key);
        let start = self
            .entries
            .range(position..)
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(p, _)| *p)
            .expect("checked non-empty above");

        // Walk ascending from `start`, wrapping once back to the beginning.
        let from_start = self.entries.range(start..);
        let from_beginning = self.entries.range(..start);
        for (_, addr) in from_start.chain(from_beginning) {
            if out.len() >= k {
                break;
            }
            if !out.iter().any(|a: &String| a == addr) {
                out.push(addr.clone());
            }
        }
        out
    }
}

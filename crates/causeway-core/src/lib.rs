//! causeway-core — shared leaf crate: digests, chunking, the placement
//! ring, wire framing, manifest encoding, and cluster config parsing.
//!
//! Every other crate in this workspace depends on this one and nothing
//! depends the other way; see DESIGN.md for the dependency order.

pub mod chunk;
pub mod config;
pub mod digest;
pub mod manifest;
pub mod ring;
pub mod transport;

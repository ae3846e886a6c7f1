//! causeway-client — upload/download orchestration against the storage
//! ring and metadata chain (spec.md §4.5, §4.6).

pub mod client;

pub use client::{Client, ClientError};

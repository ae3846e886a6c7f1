//! Fixed-size content-addressed chunking.
//!
//! File I/O proper (reading/writing paths) lives at the edge (client
//! library); this module only defines the `Chunk` type and the pure
//! splitting/reassembly logic over an in-memory byte buffer, so it can be
//! unit-tested without touching a filesystem.

use bytes::Bytes;

use crate::digest::HexDigest;

/// Maximum bytes in a chunk. Only the last chunk of a file may be smaller.
pub const CHUNK_SIZE: usize = 1_048_576;

/// A single content-addressed fragment of a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based position in the file.
    pub index: u32,
    /// Digest of `bytes`.
    pub digest: HexDigest,
    /// `bytes.len()`, kept alongside for wire encoding convenience.
    pub size: u32,
    pub bytes: Bytes,
}

/// Errors splitting a byte buffer into chunks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("cannot chunk an empty file")]
    EmptyFile,
    #[error("chunk {0} missing during reassembly")]
    MissingChunk(u32),
    #[error("chunk {index} has size {size}, exceeding CHUNK_SIZE ({CHUNK_SIZE})")]
    OversizedChunk { index: u32, size: u32 },
}

/// Split `data` into `CHUNK_SIZE` chunks in file order, hashing each.
///
/// Returns `ChunkError::EmptyFile` for a zero-length input, per spec.
pub fn split(data: &[u8]) -> Result<Vec<Chunk>, ChunkError> {
    if data.is_empty() {
        return Err(ChunkError::EmptyFile);
    }

    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE));
    for (index, piece) in data.chunks(CHUNK_SIZE).enumerate() {
        chunks.push(Chunk {
            index: index as u32,
            digest: HexDigest::of(piece),
            size: piece.len() as u32,
            bytes: Bytes::copy_from_slice(piece),
        });
    }
    Ok(chunks)
}

/// Reassemble chunks into one byte buffer, in `index` order.
///
/// Chunks may arrive out of order (e.g. fetched concurrently from
/// different replicas); this sorts by `index` and requires a complete,
/// contiguous 0..n run before assembling.
pub fn reassemble(mut chunks: Vec<Chunk>) -> Result<Vec<u8>, ChunkError> {
    chunks.sort_by_key(|c| c.index);
    let total: usize = chunks.iter().map(|c| c.bytes.len()).sum();
    let mut out = Vec::with_capacity(total);
    for (expected_index, chunk) in chunks.into_iter().enumerate() {
        if chunk.index != expected_index as u32 {
            return Err(ChunkError::MissingChunk(expected_index as u32));
        }
        out.extend_from_slice(&chunk.bytes);
    }
    Ok(out)
}

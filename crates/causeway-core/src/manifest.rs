//! `FileManifest` — the per-file record held by metadata nodes, and its
//! wire encoding/decoding (spec.md §3, §4.4, §6).

use crate::digest::{root_digest, HexDigest};

/// The manifest needed to reassemble a file from its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    pub filename: String,
    pub root_digest: HexDigest,
    pub file_size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    /// In file order; reassembly relies on this order (spec.md §3 invariant).
    pub chunk_digests: Vec<HexDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("wrong field count: expected 5 fixed fields + digest list, got {0}")]
    WrongFieldCount(usize),
    #[error("non-numeric field {field}: {value:?}")]
    NotNumeric { field: &'static str, value: String },
    #[error("digest list has {actual} entries, but totalChunks says {expected}")]
    DigestCountMismatch { expected: u32, actual: u32 },
    #[error(transparent)]
    Digest(#[from] crate::digest::DigestError),
}

impl FileManifest {
    /// Build a manifest from a file's chunk digests, computing the root
    /// digest per spec.md §4.6 (hash of the concatenated hex strings).
    pub fn new(filename: String, file_size: u64, chunk_digests: Vec<HexDigest>) -> Self {
        let total_chunks = chunk_digests.len() as u32;
        let root = root_digest(chunk_digests.iter());
        Self {
            filename,
            root_digest: root,
            file_size,
            chunk_size: crate::chunk::CHUNK_SIZE as u32,
            total_chunks,
            chunk_digests,
        }
    }

    /// Encode the comma-separated digest list, no spaces, no trailing comma.
    fn digests_csv(&self) -> String {
        self.chunk_digests
            .iter()
            .map(HexDigest::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Encode the `PUT` command body (everything after the filename is
    /// positional; see spec.md §4.4 grammar).
    pub fn encode_put(&self) -> String {
        format!(
            "PUT {} {} {} {} {} {}",
            self.filename,
            self.file_size,
            self.chunk_size,
            self.total_chunks,
            self.root_digest,
            self.digests_csv()
        )
    }

    /// Encode the `FOUND` response body (filename is supplied by the
    /// caller's `GET`, not re-sent).
    pub fn encode_found(&self) -> String {
        format!(
            "FOUND {} {} {} {} {}",
            self.file_size,
            self.chunk_size,
            self.total_chunks,
            self.root_digest,
            self.digests_csv()
        )
    }

    fn parse_digests_csv(s: &str) -> Result<Vec<HexDigest>, ManifestError> {
        if s.is_empty() {
            return Ok(Vec::new());
        }
        s.split(',').map(HexDigest::parse).map(|r| r.map_err(Into::into)).collect()
    }

    /// Parse the fixed fields `<fileSize> <chunkSize> <totalChunks>
    /// <rootDigest> <csv-digests>` shared by `PUT` (after the filename)
    /// and `FOUND` (the whole body).
    fn parse_fixed_fields(
        filename: String,
        fields: &[&str],
    ) -> Result<FileManifest, ManifestError> {
        let [file_size, chunk_size, total_chunks, root, csv] = fields else {
            return Err(ManifestError::WrongFieldCount(fields.len()));
        };
        let file_size: u64 = file_size
            .parse()
            .map_err(|_| ManifestError::NotNumeric { field: "fileSize", value: file_size.to_string() })?;
        let chunk_size: u32 = chunk_size
            .parse()
            .map_err(|_| ManifestError::NotNumeric { field: "chunkSize", value: chunk_size.to_string() })?;
        let total_chunks: u32 = total_chunks
            .parse()
            .map_err(|_| ManifestError::NotNumeric { field: "totalChunks", value: total_chunks.to_string() })?;
        let root_digest = HexDigest::parse(root)?;
        let chunk_digests = Self::parse_digests_csv(csv)?;
        if chunk_digests.len() as u32 != total_chunks {
            return Err(ManifestError::DigestCountMismatch {
                expected: total_chunks,
                actual: chunk_digests.len() as u32,
            });
        }
        Ok(FileManifest {
            filename,
            root_digest,
            file_size,
            chunk_size,
            total_chunks,
            chunk_digests,
        })
    }

    /// Parse a `PUT <filename> <fileSize> <chunkSize> <totalChunks>
    /// <rootDigest> <csv>` command (the leading `PUT` token already
    /// stripped by the caller).
    pub fn parse_put_args(args: &str) -> Result<FileManifest, ManifestError> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(ManifestError::WrongFieldCount(parts.len()));
        }
        Self::parse_fixed_fields(parts[0].to_string(), &parts[1..])
    }

    /// Parse a `FOUND <fileSize> <chunkSize> <totalChunks> <rootDigest>
    /// <csv>` response body for `filename` (the leading `FOUND` token
    /// already stripped by the caller).
    pub fn parse_found_body(filename: &str, body: &str) -> Result<FileManifest, ManifestError> {
        let parts: Vec<&str> = body.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ManifestError::WrongFieldCount(parts.len()));
        }
        Self::parse_fixed_fields(filename.to_string(), &parts)
    }

    /// The "empty manifest" predicate, tightened per spec.md §9's own
    /// recommendation: non-empty digest list AND non-empty root digest.
    /// A manifest that passes `parse_*` already satisfies the root-digest
    /// half (it's always 64 hex chars); this exists for callers that
    /// build a manifest from partially-populated wire data.
    pub fn looks_complete(&self) -> bool {
        !self.chunk_digests.is_empty() && !self.root_digest.as_str().is_empty()
    }
}

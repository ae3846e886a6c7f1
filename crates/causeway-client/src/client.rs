//! Client library: upload/download orchestration, ring-backed chunk
//! placement, and latency metrics (spec.md §4.5, §4.6).

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use causeway_core::chunk::{self, Chunk};
use causeway_core::config::ClusterConfig;
use causeway_core::digest::{root_digest, HexDigest};
use causeway_core::manifest::FileManifest;
use causeway_core::ring::{Ring, DEFAULT_REPLICATION};
use causeway_core::transport::{connect, recv_frame, send_command, send_frame};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] causeway_core::transport::TransportError),
    #[error(transparent)]
    Config(#[from] causeway_core::config::ConfigError),
    #[error(transparent)]
    Ring(#[from] causeway_core::ring::RingError),
    #[error(transparent)]
    Chunk(#[from] causeway_core::chunk::ChunkError),
    #[error(transparent)]
    Manifest(#[from] causeway_core::manifest::ManifestError),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("all replicas failed to store chunk {0}")]
    ChunkStoreFailed(HexDigest),
    #[error("no metadata endpoint acknowledged the manifest")]
    ManifestSubmitFailed,
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("chunk {0} could not be fetched from any replica")]
    ChunkMissing(HexDigest),
    #[error("recomputed CID does not match the manifest's root digest")]
    IntegrityMismatch,
}

#[derive(Default)]
struct ClientMetrics {
    last_chunk_upload_duration: Mutex<Option<Duration>>,
    last_metadata_submit_duration: Mutex<Option<Duration>>,
    last_upload_duration: Mutex<Option<Duration>>,
    last_download_duration: Mutex<Option<Duration>>,
}

/// Orchestrates upload and download against a fixed ring and an ordered
/// metadata endpoint list. Stateless between calls beyond that
/// configuration (spec.md §4.5); safe to share across threads via `Arc`.
pub struct Client {
    ring: Ring,
    metadata_endpoints: Vec<String>,
    metrics: ClientMetrics,
}

impl Client {
    pub fn new(
        storage_endpoints: Vec<String>,
        metadata_endpoints: Vec<String>,
    ) -> Result<Self, ClientError> {
        if storage_endpoints.is_empty() {
            return Err(ClientError::ConfigurationError(
                "no storage endpoints configured".into(),
            ));
        }
        if metadata_endpoints.is_empty() {
            return Err(ClientError::ConfigurationError(
                "no metadata endpoints configured".into(),
            ));
        }
        let ring = Ring::from_addresses(storage_endpoints)?;
        Ok(Self {
            ring,
            metadata_endpoints,
            metrics: ClientMetrics::default(),
        })
    }

    /// Build a client from a parsed cluster config file, in file order
    /// (spec.md §6: "an ordered list of storage endpoints ... and an
    /// ordered list of metadata endpoints").
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ClientError> {
        config.validate_non_empty()?;
        let storage = config
            .storage_nodes()
            .into_iter()
            .map(|n| n.address())
            .collect::<Vec<_>>();
        let metadata = config
            .metadata_nodes_by_id()
            .into_iter()
            .map(|n| n.address())
            .collect::<Vec<_>>();
        Self::new(storage, metadata)
    }

    pub fn last_chunk_upload_duration(&self) -> Option<Duration> {
        *self.metrics.last_chunk_upload_duration.lock().unwrap()
    }

    pub fn last_metadata_submit_duration(&self) -> Option<Duration> {
        *self.metrics.last_metadata_submit_duration.lock().unwrap()
    }

    pub fn last_upload_duration(&self) -> Option<Duration> {
        *self.metrics.last_upload_duration.lock().unwrap()
    }

    pub fn last_download_duration(&self) -> Option<Duration> {
        *self.metrics.last_download_duration.lock().unwrap()
    }

    /// Split, hash, fan out to replicas, and submit the manifest. Returns
    /// the file's CID (spec.md §4.5 upload algorithm).
    pub fn upload(&self, path: impl AsRef<Path>) -> Result<HexDigest, ClientError> {
        let overall_start = Instant::now();
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .ok_or_else(|| ClientError::ConfigurationError("path has no filename".into()))?
            .to_string_lossy()
            .into_owned();

        let chunks = chunk::split(&data)?;

        let chunk_upload_start = Instant::now();
        for c in &chunks {
            self.store_chunk_to_replicas(c)?;
        }
        self.record(&self.metrics.last_chunk_upload_duration, chunk_upload_start.elapsed());

        let digests: Vec<HexDigest> = chunks.iter().map(|c| c.digest.clone()).collect();
        let manifest = FileManifest::new(filename, data.len() as u64, digests);
        let cid = manifest.root_digest.clone();

        let metadata_start = Instant::now();
        self.submit_manifest(&manifest)?;
        self.record(&self.metrics.last_metadata_submit_duration, metadata_start.elapsed());

        self.record(&self.metrics.last_upload_duration, overall_start.elapsed());
        tracing::info!(cid = %cid, bytes = data.len(), "upload complete");
        Ok(cid)
    }

    /// Fetch the manifest from the tail-ward metadata endpoint, fetch
    /// every chunk, and reassemble into `output`. Returns the recomputed
    /// CID of the reassembled bytes (spec.md §4.5 download algorithm).
    pub fn download(&self, filename: &str, output: impl AsRef<Path>) -> Result<HexDigest, ClientError> {
        let overall_start = Instant::now();
        let manifest = self.fetch_manifest(filename)?;

        let mut chunks = Vec::with_capacity(manifest.chunk_digests.len());
        for (index, digest) in manifest.chunk_digests.iter().enumerate() {
            let bytes = self.fetch_chunk(digest)?;
            chunks.push(Chunk {
                index: index as u32,
                digest: digest.clone(),
                size: bytes.len() as u32,
                bytes,
            });
        }
        let data = chunk::reassemble(chunks)?;
        std::fs::write(output.as_ref(), &data)?;

        let recomputed = recompute_cid(&data)?;
        if recomputed != manifest.root_digest {
            return Err(ClientError::IntegrityMismatch);
        }

        self.record(&self.metrics.last_download_duration, overall_start.elapsed());
        tracing::info!(cid = %recomputed, filename, "download complete");
        Ok(recomputed)
    }

    fn record(&self, field: &Mutex<Option<Duration>>, duration: Duration) {
        *field.lock().unwrap() = Some(duration);
    }

    fn store_chunk_to_replicas(&self, chunk: &Chunk) -> Result<(), ClientError> {
        let replicas = self.ring.lookup(chunk.digest.as_str(), DEFAULT_REPLICATION);
        let successes = replicas
            .iter()
            .filter(|addr| self.store_chunk_at(addr, chunk))
            .count();
        if successes == 0 {
            return Err(ClientError::ChunkStoreFailed(chunk.digest.clone()));
        }
        Ok(())
    }

    fn store_chunk_at(&self, addr: &str, chunk: &Chunk) -> bool {
        let Ok(mut stream) = connect(addr) else {
            return false;
        };
        let command = format!("STORE {}", chunk.digest);
        if send_frame(&mut stream, command.as_bytes()).is_err() {
            return false;
        }
        if recv_frame(&mut stream) != b"READY" {
            return false;
        }
        if send_frame(&mut stream, &chunk.bytes).is_err() {
            return false;
        }
        recv_frame(&mut stream) == b"ACK"
    }

    fn submit_manifest(&self, manifest: &FileManifest) -> Result<(), ClientError> {
        let command = manifest.encode_put();
        for addr in &self.metadata_endpoints {
            match send_command(addr, &command) {
                Some(resp) if resp == "ACK" => return Ok(()),
                Some(resp) => tracing::debug!(endpoint = %addr, response = %resp, "PUT not acked"),
                None => tracing::debug!(endpoint = %addr, "PUT endpoint unreachable"),
            }
        }
        Err(ClientError::ManifestSubmitFailed)
    }

    /// Reverse-listed-order per spec.md §4.5: pragmatically prefers the
    /// tail in a typical configuration without requiring it structurally.
    fn fetch_manifest(&self, filename: &str) -> Result<FileManifest, ClientError> {
        for addr in self.metadata_endpoints.iter().rev() {
            let Some(resp) = send_command(addr, &format!("GET {filename}")) else {
                continue;
            };
            let Some(body) = resp.strip_prefix("FOUND ") else {
                continue;
            };
            let Ok(manifest) = FileManifest::parse_found_body(filename, body) else {
                continue;
            };
            if manifest.looks_complete() {
                return Ok(manifest);
            }
        }
        Err(ClientError::NotFound(filename.to_string()))
    }

    fn fetch_chunk(&self, digest: &HexDigest) -> Result<Bytes, ClientError> {
        let replicas = self.ring.lookup(digest.as_str(), DEFAULT_REPLICATION);
        for addr in &replicas {
            if let Some(bytes) = self.fetch_chunk_at(addr, digest) {
                return Ok(bytes);
            }
        }
        Err(ClientError::ChunkMissing(digest.clone()))
    }

    fn fetch_chunk_at(&self, addr: &str, digest: &HexDigest) -> Option<Bytes> {
        let mut stream = connect(addr).ok()?;
        send_frame(&mut stream, format!("GET {digest}").as_bytes()).ok()?;
        if recv_frame(&mut stream) != b"FOUND" {
            return None;
        }
        let body = recv_frame(&mut stream);
        if body.is_empty() {
            return None;
        }
        Some(Bytes::from(body))
    }
}

/// Recompute the CID of a reconstructed file (spec.md §4.6): re-split and
/// re-hash exactly as upload did, rather than trusting the digests that
/// came back over the wire.
fn recompute_cid(data: &[u8]) -> Result<HexDigest, ClientError> {
    let chunks = chunk::split(data)?;
    Ok(root_digest(chunks.iter().map(|c| &c.digest)))
}

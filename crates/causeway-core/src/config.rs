//! Cluster configuration file parsing (spec.md §6).
//!
//! Format: one node per line, `<id> <host> <port>`. `#`-prefixed comments
//! and blank lines are ignored. Nodes with `id >= 11` are metadata nodes;
//! all others are storage nodes. Both node binaries and the client/CLI
//! share this parser and grammar.

use std::path::Path;

/// The id threshold above (inclusive) which a node is a metadata node
/// rather than a storage node, per spec.md §6.
pub const METADATA_ID_THRESHOLD: u32 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub id: u32,
    pub host: String,
    pub port: u16,
}

impl NodeEntry {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_metadata(&self) -> bool {
        self.id >= METADATA_ID_THRESHOLD
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read cluster config {path}: {source}")]
    Read { path: String, source: std::sync::Arc<std::io::Error> },
    #[error("line {line}: expected '<id> <host> <port>', got {text:?}")]
    MalformedLine { line: usize, text: String },
    #[error("node id {0} not found in cluster config")]
    NodeNotFound(u32),
    #[error("cluster config has no storage nodes")]
    NoStorageNodes,
    #[error("cluster config has no metadata nodes")]
    NoMetadataNodes,
}

/// A parsed cluster configuration: every node, in file order.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeEntry>,
}

impl ClusterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path_str,
            source: std::sync::Arc::new(e),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut nodes = Vec::new();
        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [id, host, port] = parts[..] else {
                return Err(ConfigError::MalformedLine {
                    line: line_no + 1,
                    text: raw_line.to_string(),
                });
            };
            let id: u32 = id.parse().map_err(|_| ConfigError::MalformedLine {
                line: line_no + 1,
                text: raw_line.to_string(),
            })?;
            let port: u16 = port.parse().map_err(|_| ConfigError::MalformedLine {
                line: line_no + 1,
                text: raw_line.to_string(),
            })?;
            nodes.push(NodeEntry {
                id,
                host: host.to_string(),
                port,
            });
        }
        Ok(Self { nodes })
    }

    pub fn node(&self, id: u32) -> Result<&NodeEntry, ConfigError> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or(ConfigError::NodeNotFound(id))
    }

    /// All storage nodes (`id < 11`), in file order.
    pub fn storage_nodes(&self) -> Vec<&NodeEntry> {
        self.nodes.iter().filter(|n| !n.is_metadata()).collect()
    }

    /// All metadata nodes (`id >= 11`), sorted ascending by id — the
    /// order bootstrap chain-wiring assigns `next` pointers in
    /// (spec.md §6: "launched in descending order ... each earlier node
    /// is given the later one as its next").
    pub fn metadata_nodes_by_id(&self) -> Vec<&NodeEntry> {
        let mut nodes: Vec<&NodeEntry> = self.nodes.iter().filter(|n| n.is_metadata()).collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// The `next` endpoint for metadata node `id` at bootstrap: the
    /// metadata node with the next-higher id, or `None` if `id` is the
    /// highest (making it the initial TAIL).
    pub fn next_metadata_endpoint(&self, id: u32) -> Option<&NodeEntry> {
        let ordered = self.metadata_nodes_by_id();
        let position = ordered.iter().position(|n| n.id == id)?;
        ordered.get(position + 1).copied()
    }

    /// Validate there is at least one storage and one metadata node —
    /// required before any client can be constructed (spec.md §3
    /// invariant: "the ring is non-empty before any upload").
    pub fn validate_non_empty(&self) -> Result<(), ConfigError> {
        if self.storage_nodes().is_empty() {
            return Err(ConfigError::NoStorageNodes);
        }
        if self.metadata_nodes_by_id().is_empty() {
            return Err(ConfigError::NoMetadataNodes);
        }
        Ok(())
    }
}

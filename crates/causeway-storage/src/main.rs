//! storage-node — binary entry point.
//!
//! Usage: storage-node <config_file> <node_id>

use anyhow::{bail, Context, Result};
use causeway_core::config::ClusterConfig;
use causeway_storage::StorageNode;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(node_id_str)) = (args.next(), args.next()) else {
        bail!("usage: storage-node <config_file> <node_id>");
    };

    let node_id: u32 = node_id_str
        .parse()
        .with_context(|| format!("invalid node id: {node_id_str:?}"))?;

    let config = ClusterConfig::load(&config_path)
        .with_context(|| format!("loading cluster config {config_path:?}"))?;
    let me = config.node(node_id)?;
    if me.is_metadata() {
        bail!("node {node_id} has id >= 11 and is configured as a metadata node, not storage");
    }

    tracing::info!(node_id, port = me.port, "storage node starting");
    let node = StorageNode::start(me.port).with_context(|| format!("binding port {}", me.port))?;
    node.run();
    tracing::info!(node_id, "storage node stopped");
    Ok(())
}

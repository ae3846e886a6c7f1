//! metadata-node — binary entry point.
//!
//! Usage: metadata-node <config_file> <node_id>
//!
//! Chain wiring at bootstrap (spec.md §6): the node's `next` is the
//! metadata node with the next-higher id in the config file, or `None` if
//! this is the highest-id metadata node (the initial TAIL).

use anyhow::{bail, Context, Result};
use causeway_core::config::ClusterConfig;
use causeway_metadata::MetadataNode;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(node_id_str)) = (args.next(), args.next()) else {
        bail!("usage: metadata-node <config_file> <node_id>");
    };

    let node_id: u32 = node_id_str
        .parse()
        .with_context(|| format!("invalid node id: {node_id_str:?}"))?;

    let config = ClusterConfig::load(&config_path)
        .with_context(|| format!("loading cluster config {config_path:?}"))?;
    let me = config.node(node_id)?;
    if !me.is_metadata() {
        bail!("node {node_id} has id < 11 and is configured as a storage node, not metadata");
    }
    let next = config.next_metadata_endpoint(node_id).map(|n| n.address());

    tracing::info!(node_id, port = me.port, next = ?next, "metadata node starting");
    let node = MetadataNode::start(me.port, me.address(), next)
        .with_context(|| format!("binding port {}", me.port))?;
    node.run();
    tracing::info!(node_id, "metadata node stopped");
    Ok(())
}

//! Shared harness for spinning up real nodes as background threads within
//! the test process — no external process spawning, no tokio, mirroring
//! how the original system tests drove the same nodes in-process.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use causeway_core::transport::send_command;
use causeway_metadata::MetadataNode;
use causeway_storage::StorageNode;

pub fn loopback(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

pub struct RunningStorage {
    pub node: Arc<StorageNode>,
    pub addr: String,
    handle: JoinHandle<()>,
}

impl RunningStorage {
    pub fn stop(self) {
        self.node.stop();
        self.handle.join().unwrap();
    }
}

/// Binds on an OS-assigned port (0) so tests never collide with each
/// other's fixed port ranges, then reads back the real address.
pub fn start_storage() -> RunningStorage {
    let node = StorageNode::start(0).expect("bind storage node");
    let port = node.local_addr().port();
    let run_node = node.clone();
    let handle = std::thread::spawn(move || run_node.run());
    wait_until_listening(port);
    RunningStorage {
        node,
        addr: loopback(port),
        handle,
    }
}

pub struct RunningMetadata {
    pub node: Arc<MetadataNode>,
    pub addr: String,
    handle: JoinHandle<()>,
}

impl RunningMetadata {
    pub fn stop(self) {
        self.node.stop();
        self.handle.join().unwrap();
    }

    /// Send a raw `DIE` as an external peer would, simulating a node
    /// crash from the outside rather than calling `stop()` in-process.
    pub fn kill(&self) {
        send_command(&self.addr, "DIE");
    }
}

/// Start a chain of `n` metadata nodes wired at bootstrap per spec.md §6,
/// bound at `base_port..base_port + n`. Ports are explicit (not OS-assigned)
/// because each node's `self_addr` must be known before construction, so it
/// can correctly identify itself in `UPDATE_PREV` announcements sent during
/// automatic chain reconfiguration; callers should give each test file its
/// own non-overlapping port range to avoid collisions between test binaries
/// running concurrently. The highest id is launched first with no `next`;
/// each earlier node is given the later one's address as `next`. Returns
/// nodes in ascending-id order (`chain[0]` is the initial HEAD, `chain[n-1]`
/// the initial TAIL) — the same order a cluster config file would list them
/// in. Skip links are set two hops downstream for every node that has one.
pub fn start_metadata_chain(base_port: u16, n: usize) -> Vec<RunningMetadata> {
    let ports: Vec<u16> = (0..n).map(|i| base_port + i as u16).collect();
    let addrs: Vec<String> = ports.iter().map(|p| loopback(*p)).collect();

    let mut chain: Vec<Option<RunningMetadata>> = (0..n).map(|_| None).collect();
    for i in (0..n).rev() {
        let next = if i + 1 < n { Some(addrs[i + 1].clone()) } else { None };
        let node = MetadataNode::start(ports[i], addrs[i].clone(), next).expect("bind metadata node");
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());
        wait_until_listening(ports[i]);
        chain[i] = Some(RunningMetadata {
            node,
            addr: addrs[i].clone(),
            handle,
        });
    }
    let chain: Vec<RunningMetadata> = chain.into_iter().map(Option::unwrap).collect();

    for i in 0..n {
        if i + 2 < n {
            let skip_ip_port = addrs[i + 2].replace(':', " ");
            let resp = send_command(&chain[i].addr, &format!("SET_SKIP {skip_ip_port}"));
            assert_eq!(resp.as_deref(), Some("ACK"), "SET_SKIP should be acked");
        }
    }

    chain
}

fn wait_until_listening(port: u16) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if TcpStream::connect(loopback(port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("node on port {port} never started listening");
}

/// Deterministic pseudo-random bytes (xorshift64), avoiding a dependency
/// on a random-number crate for test fixtures.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed ^ 0x9E3779B97F4A7C15;
    if state == 0 {
        state = 1;
    }
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push((state & 0xFF) as u8);
    }
    out
}

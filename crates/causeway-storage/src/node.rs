//! Storage node protocol handling and lifecycle (spec.md §4.3).
//!
//! `STORE <digest>` -> `READY`, binary frame, `ACK`.
//! `GET <digest>`   -> `FOUND` + binary frame, or `NOT_FOUND`.
//! `DIE`            -> graceful shutdown, no response.
//! anything else    -> `ERROR`.

use std::sync::Arc;

use bytes::Bytes;
use causeway_core::digest::HexDigest;
use causeway_core::transport::{ClientId, FrameServer, TransportError};

use crate::store::StorageStore;

/// Errors starting or running a storage node. Protocol-level failures
/// (bad opcodes, missing digests) are handled as wire responses, not
/// `Result`s — this only covers failures at node setup.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct StorageNode {
    server: Arc<FrameServer>,
    store: StorageStore,
}

impl StorageNode {
    pub fn start(port: u16) -> Result<Arc<Self>, StorageError> {
        let server = Arc::new(FrameServer::start(port)?);
        Ok(Arc::new(Self {
            server,
            store: StorageStore::new(),
        }))
    }

    /// The address this node is actually bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr().expect("server is bound")
    }

    /// Run the accept loop on the calling thread. Spawns one handler
    /// thread per accepted connection and returns only once `stop()` has
    /// been called and every handler has finished, per spec.md §5.
    pub fn run(self: &Arc<Self>) {
        while let Some(id) = self.server.accept() {
            self.server.handler_started();
            let node = self.clone();
            std::thread::spawn(move || {
                node.handle_connection(id);
                node.server.handler_finished();
            });
        }
        self.server.join_handlers();
    }

    pub fn stop(&self) {
        self.server.stop();
    }

    /// Number of chunks currently held — used by tests and the `verify`
    /// CLI path indirectly through the download flow.
    pub fn chunk_count(&self) -> usize {
        self.store.len()
    }

    fn handle_connection(&self, id: ClientId) {
        loop {
            let command = self.server.recv(id);
            if command.is_empty() {
                break;
            }
            let Ok(text) = String::from_utf8(command) else {
                self.server.send(id, b"ERROR").ok();
                continue;
            };
            let mut parts = text.splitn(2, ' ');
            let op = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("").trim();

            match op {
                "STORE" => {
                    if !self.handle_store(id, rest) {
                        break;
                    }
                }
                "GET" => self.handle_get(id, rest),
                "DIE" => {
                    tracing::info!("received DIE, shutting down storage node");
                    self.stop();
                    break;
                }
                _ => {
                    self.server.send(id, b"ERROR").ok();
                }
            }
        }
        self.server.close(id);
    }

    /// Returns `false` if the connection should be closed (framing
    /// failure partway through the STORE exchange).
    fn handle_store(&self, id: ClientId, digest_str: &str) -> bool {
        let Ok(digest) = HexDigest::parse(digest_str) else {
            self.server.send(id, b"ERROR").ok();
            return true;
        };
        if self.server.send(id, b"READY").is_err() {
            return false;
        }
        let body = self.server.recv(id);
        if body.is_empty() {
            return false;
        }
        self.store.put(digest.clone(), Bytes::from(body));
        tracing::debug!(digest = %digest, "stored chunk");
        self.server.send(id, b"ACK").is_ok()
    }

    fn handle_get(&self, id: ClientId, digest_str: &str) {
        let Ok(digest) = HexDigest::parse(digest_str) else {
            self.server.send(id, b"ERROR").ok();
            return;
        };
        match self.store.get(&digest) {
            Some(bytes) => {
                if self.server.send(id, b"FOUND").is_ok() {
                    self.server.send(id, &bytes).ok();
                    tracing::debug!(digest = %digest, "served chunk");
                }
            }
            None => {
                self.server.send(id, b"NOT_FOUND").ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::transport::{connect, recv_frame, send_frame};

    fn start_test_node() -> (Arc<StorageNode>, std::net::SocketAddr) {
        let node = StorageNode::start(0).unwrap();
        let addr = node.local_addr();
        (node, addr)
    }

    #[test]
    fn store_then_get_round_trips() {
        let (node, addr) = start_test_node();
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());

        let digest = HexDigest::of(b"hello world");
        let mut stream = connect(&addr.to_string()).unwrap();
        send_frame(&mut stream, format!("STORE {digest}").as_bytes()).unwrap();
        assert_eq!(recv_frame(&mut stream), b"READY");
        send_frame(&mut stream, b"hello world").unwrap();
        assert_eq!(recv_frame(&mut stream), b"ACK");

        send_frame(&mut stream, format!("GET {digest}").as_bytes()).unwrap();
        assert_eq!(recv_frame(&mut stream), b"FOUND");
        assert_eq!(recv_frame(&mut stream), b"hello world");

        node.stop();
        handle.join().unwrap();
    }

    #[test]
    fn get_missing_digest_is_not_found() {
        let (node, addr) = start_test_node();
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());

        let digest = HexDigest::of(b"never stored");
        let mut stream = connect(&addr.to_string()).unwrap();
        send_frame(&mut stream, format!("GET {digest}").as_bytes()).unwrap();
        assert_eq!(recv_frame(&mut stream), b"NOT_FOUND");

        node.stop();
        handle.join().unwrap();
    }

    #[test]
    fn unknown_opcode_is_error() {
        let (node, addr) = start_test_node();
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());

        let mut stream = connect(&addr.to_string()).unwrap();
        send_frame(&mut stream, b"FROBNICATE").unwrap();
        assert_eq!(recv_frame(&mut stream), b"ERROR");

        node.stop();
        handle.join().unwrap();
    }

    #[test]
    fn die_stops_the_node() {
        let (node, addr) = start_test_node();
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());

        let mut stream = connect(&addr.to_string()).unwrap();
        send_frame(&mut stream, b"DIE").unwrap();

        handle.join().unwrap();
        assert!(!node.server.is_running());
    }

    #[test]
    fn repeated_store_is_idempotent() {
        let (node, addr) = start_test_node();
        let run_node = node.clone();
        let handle = std::thread::spawn(move || run_node.run());

        let digest = HexDigest::of(b"same");
        for _ in 0..2 {
            let mut stream = connect(&addr.to_string()).unwrap();
            send_frame(&mut stream, format!("STORE {digest}").as_bytes()).unwrap();
            assert_eq!(recv_frame(&mut stream), b"READY");
            send_frame(&mut stream, b"same").unwrap();
            assert_eq!(recv_frame(&mut stream), b"ACK");
        }
        assert_eq!(node.chunk_count(), 1);

        node.stop();
        handle.join().unwrap();
    }
}

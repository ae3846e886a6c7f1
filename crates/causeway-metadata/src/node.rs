//! Metadata node protocol handling, chain forwarding, and the health-check
//! loop (spec.md §4.4).
//!
//! `PUT` -> `ACK` / `ERROR_ARGS` / `ERROR_FORWARD`.
//! `GET` -> `FOUND ...` / `NOT_FOUND` / `REDIRECT_TO_TAIL`.
//! `PING` -> `PONG`. `UPDATE_PREV`/`UPDATE_NEXT`/`SET_SKIP` -> `ACK`.
//! `GET_STATUS` -> `ROLE=.. NEXT=.. PREV=..`. `DIE` -> graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use causeway_core::manifest::FileManifest;
use causeway_core::transport::{
    connect, recv_frame, send_command, send_frame, ClientId, FrameServer, TransportError,
};

use crate::chain::{ChainState, Role};
use crate::store::ManifestStore;

/// How often a non-tail node probes `next` with `PING` (spec.md §4.4).
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Errors starting or running a metadata node. Protocol-level failures
/// (`ERROR_ARGS`, `ERROR_FORWARD`, `REDIRECT_TO_TAIL`) are wire responses,
/// not `Result`s — this only covers failures at node setup.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct MetadataNode {
    server: Arc<FrameServer>,
    self_addr: String,
    chain: Mutex<ChainState>,
    manifests: ManifestStore,
    health_check_running: AtomicBool,
}

impl MetadataNode {
    /// `self_addr` is the host:port peers should use to reach this node
    /// (distinct from the bound socket address, which may be `0.0.0.0`).
    pub fn start(
        port: u16,
        self_addr: String,
        next: Option<String>,
    ) -> Result<Arc<Self>, MetadataError> {
        let server = Arc::new(FrameServer::start(port)?);
        Ok(Arc::new(Self {
            server,
            self_addr,
            chain: Mutex::new(ChainState::new(next)),
            manifests: ManifestStore::new(),
            health_check_running: AtomicBool::new(true),
        }))
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr().expect("server is bound")
    }

    pub fn role(&self) -> Role {
        self.chain.lock().unwrap().role()
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests.len()
    }

    /// Run the accept loop plus the health-check loop; returns once
    /// `stop()` has drained every handler, per spec.md §5.
    pub fn run(self: &Arc<Self>) {
        let health_check = self.clone();
        let health_handle = std::thread::spawn(move || health_check.health_check_loop());

        while let Some(id) = self.server.accept() {
            self.server.handler_started();
            let node = self.clone();
            std::thread::spawn(move || {
                node.handle_connection(id);
                node.server.handler_finished();
            });
        }
        self.server.join_handlers();
        self.health_check_running.store(false, Ordering::SeqCst);
        health_handle.join().ok();
    }

    pub fn stop(&self) {
        self.server.stop();
    }

    fn health_check_loop(&self) {
        while self.health_check_running.load(Ordering::SeqCst) {
            std::thread::sleep(HEALTH_CHECK_INTERVAL);
            if !self.health_check_running.load(Ordering::SeqCst) {
                break;
            }
            let Some(next_addr) = self.chain.lock().unwrap().next() else {
                continue;
            };
            let alive = send_command(&next_addr, "PING").as_deref() == Some("PONG");
            if !alive {
                tracing::warn!(next = %next_addr, "health check failed, reconfiguring chain");
                self.reconfigure_after_next_failure();
            }
        }
    }

    fn reconfigure_after_next_failure(&self) {
        let promoted = self.chain.lock().unwrap().reconfigure_after_next_failure();
        if let Some(new_next) = promoted {
            // `UPDATE_PREV <ip> <port>` is two whitespace-separated tokens
            // (spec.md §4.4), not the colon-joined `host:port` form
            // `self_addr` is stored in.
            let command = format!("UPDATE_PREV {}", self.self_addr.replace(':', " "));
            let ack = send_command(&new_next, &command);
            if ack.as_deref() != Some("ACK") {
                tracing::warn!(new_next = %new_next, "failed to announce predecessor after promotion");
            }
        }
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
                "PUT" => self.handle_put(id, rest),
                "GET" => self.handle_get(id, rest),
                "PING" => {
                    self.server.send(id, b"PONG").ok();
                }
                "UPDATE_PREV" => self.handle_update_prev(id, rest),
                "UPDATE_NEXT" => self.handle_update_next(id, rest),
                "SET_SKIP" => self.handle_set_skip(id, rest),
                "GET_STATUS" => {
                    let status = self.chain.lock().unwrap().status_line();
                    self.server.send(id, status.as_bytes()).ok();
                }
                "DIE" => {
                    tracing::info!("received DIE, shutting down metadata node");
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

    fn handle_put(&self, id: ClientId, rest: &str) {
        let manifest = match FileManifest::parse_put_args(rest) {
            Ok(m) => m,
            Err(_) => {
                self.server.send(id, b"ERROR_ARGS").ok();
                return;
            }
        };
        self.manifests.put(manifest.filename.clone(), manifest);

        let (readable, next) = {
            let chain = self.chain.lock().unwrap();
            (chain.is_readable(), chain.next())
        };
        let Some(next_addr) = (if readable { None } else { next }) else {
            self.server.send(id, b"ACK").ok();
            return;
        };

        let command = format!("PUT {rest}");
        let forwarded_ack = connect(&next_addr).ok().and_then(|mut stream| {
            send_frame(&mut stream, command.as_bytes()).ok()?;
            Some(recv_frame(&mut stream))
        });
        match forwarded_ack {
            Some(ack) if ack == b"ACK" => {
                self.server.send(id, b"ACK").ok();
            }
            _ => {
                self.server.send(id, b"ERROR_FORWARD").ok();
            }
        }
    }

    fn handle_get(&self, id: ClientId, filename: &str) {
        let readable = self.chain.lock().unwrap().is_readable();
        if !readable {
            self.server.send(id, b"REDIRECT_TO_TAIL").ok();
            return;
        }
        match self.manifests.get(filename) {
            Some(manifest) => {
                self.server.send(id, manifest.encode_found().as_bytes()).ok();
            }
            None => {
                self.server.send(id, b"NOT_FOUND").ok();
            }
        }
    }

    fn handle_update_prev(&self, id: ClientId, rest: &str) {
        match parse_ip_port(rest) {
            Some(addr) => {
                self.chain.lock().unwrap().set_prev(addr);
                self.server.send(id, b"ACK").ok();
            }
            None => {
                self.server.send(id, b"ERROR_ARGS").ok();
            }
        }
    }

    fn handle_update_next(&self, id: ClientId, rest: &str) {
        match parse_ip_port(rest) {
            Some(addr) => {
                self.chain.lock().unwrap().set_next(addr);
                self.server.send(id, b"ACK").ok();
            }
            None => {
                self.server.send(id, b"ERROR_ARGS").ok();
            }
        }
    }

    fn handle_set_skip(&self, id: ClientId, rest: &str) {
        match parse_ip_port(rest) {
            Some(addr) => {
                self.chain.lock().unwrap().set_skip(addr);
                self.server.send(id, b"ACK").ok();
            }
            None => {
                self.server.send(id, b"ERROR_ARGS").ok();
            }
        }
    }
}

fn parse_ip_port(rest: &str) -> Option<String> {
    let mut parts = rest.split_whitespace();
    let ip = parts.next()?;
    let port = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    port.parse::<u16>().ok()?;
    Some(format!("{ip}:{port}"))
}

//! Length-prefixed framing over TCP — the one transport every role speaks.
//!
//! Frame format: a 4-byte big-endian length prefix followed by that many
//! payload bytes. Payloads are either UTF-8 text commands/responses or
//! opaque chunk bytes; the framing layer does not care which.
//!
//! [`FrameServer`] is the accept side (storage node, metadata node).
//! [`connect`]/[`send_frame`]/[`recv_frame`] are the connect-and-send-one-
//! shot side, used both by outbound peer calls (chain forward, health
//! ping) and by the client library.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

/// How long the accept loop sleeps between polls of a non-blocking
/// listener while checking whether `stop()` was requested.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Minimum accept backlog, per spec.md §4.1.
const LISTEN_BACKLOG: i32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bind failed on port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
    #[error("connect failed to {addr}: {source}")]
    Connect { addr: String, source: std::io::Error },
    #[error("unknown client id {0:?}")]
    UnknownClient(ClientId),
    #[error("server is not running")]
    NotRunning,
}

/// Opaque handle to an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// Write one frame: 4-byte big-endian length, then the payload.
/// Retries partial writes internally (`write_all` already loops).
fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    w.write_all(&len.to_be_bytes())?;
    w.write_all(payload)?;
    w.flush()
}

/// Read one frame. Any failure — closed connection, short header,
/// truncated body — is reported as an empty vector rather than an error,
/// matching spec.md §4.1 ("recv ... is reported as an empty result").
fn read_frame<R: Read>(r: &mut R) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    if r.read_exact(&mut len_buf).is_err() {
        return Vec::new();
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    if r.read_exact(&mut body).is_err() {
        return Vec::new();
    }
    body
}

/// Connect to `addr` as a plain outbound client (no accept loop involved).
pub fn connect(addr: &str) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Send one frame on an owned outbound stream.
pub fn send_frame(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    write_frame(stream, payload)
}

/// Receive one frame on an owned outbound stream. Empty on any failure.
pub fn recv_frame(stream: &mut TcpStream) -> Vec<u8> {
    read_frame(stream)
}

/// Send a UTF-8 text command and read back one text response, in one
/// round trip. Used for every outbound command that isn't `STORE` (which
/// needs a second binary frame).
pub fn send_command(addr: &str, command: &str) -> Option<String> {
    let mut stream = connect(addr).ok()?;
    send_frame(&mut stream, command.as_bytes()).ok()?;
    let resp = recv_frame(&mut stream);
    if resp.is_empty() {
        return None;
    }
    String::from_utf8(resp).ok()
}

/// The accept side of the framing protocol — binds, accepts, and
/// multiplexes reads/writes to many connections by opaque [`ClientId`].
///
/// The client table is the only thing the lock protects: `send`/`recv`
/// clone the stream handle under the lock and do their I/O after
/// releasing it, so two connections never serialize against each other.
pub struct FrameServer {
    /// `None` once [`FrameServer::stop`] has closed it, per spec.md §4.1
    /// ("`stop()` must close the listener and all live client sockets").
    listener: Mutex<Option<TcpListener>>,
    clients: Mutex<HashMap<ClientId, TcpStream>>,
    next_id: AtomicU64,
    running: AtomicBool,
    active_handlers: Mutex<u64>,
    handlers_idle: Condvar,
}

impl FrameServer {
    /// Bind and listen on `port`. Sets `SO_REUSEADDR` and a backlog of at
    /// least 50, per spec.md §4.1.
    pub fn start(port: u16) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(|source| {
            TransportError::Bind { port, source }
        })?;
        socket.set_reuse_address(true).map_err(|source| TransportError::Bind { port, source })?;
        let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
        socket.bind(&addr.into()).map_err(|source| TransportError::Bind { port, source })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| TransportError::Bind { port, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { port, source })?;
        let listener: TcpListener = socket.into();

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(true),
            active_handlers: Mutex::new(0),
            handlers_idle: Condvar::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The address this server is actually bound to (useful when started
    /// on port 0 for tests). `Err` once `stop()` has closed the listener.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self.listener.lock().unwrap().as_ref() {
            Some(listener) => listener.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener closed by stop()",
            )),
        }
    }

    /// Block until a connection is accepted or the server is stopped.
    /// Returns `None` once `stop()` has been called and no more
    /// connections will be accepted.
    pub fn accept(&self) -> Option<ClientId> {
        loop {
            if !self.is_running() {
                return None;
            }
            let accepted = {
                let listener = self.listener.lock().unwrap();
                match listener.as_ref() {
                    Some(listener) => listener.accept(),
                    None => return None,
                }
            };
            match accepted {
                Ok((stream, _addr)) => {
                    stream.set_nodelay(true).ok();
                    let id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
                    self.clients.lock().unwrap().insert(id, stream);
                    return Some(id);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "transient accept error");
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
            }
        }
    }

    /// Send one frame to `id`. Errors (including an unknown id) close
    /// that connection, per spec.md's failure model.
    pub fn send(&self, id: ClientId, payload: &[u8]) -> Result<(), TransportError> {
        let mut stream = {
            let clients = self.clients.lock().unwrap();
            clients
                .get(&id)
                .ok_or(TransportError::UnknownClient(id))?
                .try_clone()
                .map_err(|source| TransportError::Connect {
                    addr: "<client>".to_string(),
                    source,
                })?
        };
        if write_frame(&mut stream, payload).is_err() {
            self.close(id);
            return Err(TransportError::UnknownClient(id));
        }
        Ok(())
    }

    /// Receive one frame from `id`. Empty on any failure or unknown id,
    /// matching the transport's uniform failure-is-empty contract.
    pub fn recv(&self, id: ClientId) -> Vec<u8> {
        let mut stream = {
            let clients = self.clients.lock().unwrap();
            match clients.get(&id).and_then(|s| s.try_clone().ok()) {
                Some(s) => s,
                None => return Vec::new(),
            }
        };
        read_frame(&mut stream)
    }

    /// Register the start of a handler thread for `id`. Must be balanced
    /// with [`FrameServer::handler_finished`].
    pub fn handler_started(&self) {
        *self.active_handlers.lock().unwrap() += 1;
    }

    /// Mark a handler thread as finished, waking anyone waiting in
    /// [`FrameServer::join_handlers`].
    pub fn handler_finished(&self) {
        let mut count = self.active_handlers.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.handlers_idle.notify_all();
        }
    }

    /// Close one connection and drop it from the client table.
    pub fn close(&self, id: ClientId) {
        let mut clients = self.clients.lock().unwrap();
        if let Some(stream) = clients.remove(&id) {
            stream.shutdown(std::net::Shutdown::Both).ok();
        }
    }

    /// Stop accepting new connections and close every live client socket,
    /// per spec.md §4.1. Releases the listening socket itself (not just
    /// `running`), so the port is free as soon as `stop()` returns. Does
    /// not wait for in-flight handlers — call [`FrameServer::join_handlers`]
    /// for that.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.listener.lock().unwrap().take(); // drop closes the socket
        let mut clients = self.clients.lock().unwrap();
        for (_, stream) in clients.drain() {
            stream.shutdown(std::net::Shutdown::Both).ok();
        }
    }

    /// Block until every handler started via [`FrameServer::handler_started`]
    /// has called [`FrameServer::handler_finished`]. Only returns promptly
    /// once `running` has been cleared — callers should `stop()` first.
    pub fn join_handlers(&self) {
        let count = self.active_handlers.lock().unwrap();
        let _unused = self
            .handlers_idle
            .wait_while(count, |c| *c > 0)
            .unwrap();
    }
}

/// Resolve `host:port` to a string the ring/transport can use uniformly,
/// without actually connecting. Used by config loaders.
pub fn normalize_addr(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// Best-effort address resolution check (used by config validation only;
/// the ring itself never resolves, it just hashes the string).
pub fn resolvable(addr: &str) -> bool {
    addr.to_socket_addrs().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trip_in_memory() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor), b"hello");
    }

    #[test]
    fn read_frame_on_empty_input_is_empty() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).is_empty());
    }

    #[test]
    fn read_frame_on_truncated_body_is_empty() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_empty());
    }

    #[test]
    fn server_accepts_and_echoes() {
        let server = FrameServer::start(0).unwrap();
        let port = server.local_addr().unwrap().port();
        let server = std::sync::Arc::new(server);

        let accept_server = server.clone();
        let handle = std::thread::spawn(move || {
            let id = accept_server.accept().unwrap();
            let msg = accept_server.recv(id);
            accept_server.send(id, &msg).unwrap();
            accept_server.close(id);
        });

        let mut stream = connect(&format!("127.0.0.1:{port}")).unwrap();
        send_frame(&mut stream, b"ping").unwrap();
        let resp = recv_frame(&mut stream);
        assert_eq!(resp, b"ping");

        handle.join().unwrap();
        server.stop();
    }

    #[test]
    fn stop_unblocks_accept() {
        let server = std::sync::Arc::new(FrameServer::start(0).unwrap());
        let accept_server = server.clone();
        let handle = std::thread::spawn(move || accept_server.accept());
        std::thread::sleep(Duration::from_millis(50));
        server.stop();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn stop_closes_the_listener_and_frees_the_port() {
        let server = FrameServer::start(0).unwrap();
        let port = server.local_addr().unwrap().port();
        server.stop();

        // The listener itself must be released, not just `running`
        // flipped, so the port is immediately free for another bind
        // (spec.md §4.1: "stop() must close the listener ...").
        assert!(server.local_addr().is_err());
        FrameServer::start(port).unwrap_or_else(|e| {
            panic!("port {port} should be free immediately after stop(): {e}")
        });
    }
}

//! Socket transport abstraction for control connections.

use crate::error::EnvError;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};
use std::net::{Shutdown, TcpStream};

/// Non-blocking byte transport underneath an IO worker.
///
/// # Implementations
///
/// - **Production**: `TcpSocket` - a non-blocking `TcpStream`
/// - **Simulation/tests**: `MockSocket` - an in-memory socket pair
///
/// # Packet Flow
///
/// ```text
/// Switch worker               Socket                 Controller
///   |                           |                          |
///   |-- send(bytes) ----------->|------------------------->|
///   |                           |                          |
///   |<-- recv(buf) -------------|<-------------------------|
/// ```
///
/// No call ever blocks: `send` reports how many bytes were accepted and
/// `recv` reports `Ok(0)` when nothing is available yet.
pub trait Socket {
    /// Writes as much of `data` as the transport accepts right now.
    ///
    /// # Returns
    /// * `Ok(n)` - `n` bytes accepted (possibly 0 if the transport is full)
    /// * `Err(EnvError::ConnectionClosed)` - the socket is closed
    fn send(&mut self, data: &[u8]) -> Result<usize, EnvError>;

    /// Reads whatever is available into `buf`.
    ///
    /// # Returns
    /// * `Ok(0)` - nothing available yet
    /// * `Ok(n)` - `n` bytes read
    /// * `Err(EnvError::ConnectionClosed)` - the peer hung up
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EnvError>;

    /// Closes the socket. Idempotent.
    fn close(&mut self);

    /// Returns true once the socket has been closed from either side.
    fn is_closed(&self) -> bool;

    /// Human-readable peer description for logging.
    fn peer(&self) -> String;
}

/// Opens sockets to controller addresses.
///
/// The orchestrator never calls `TcpStream::connect` itself, so tests can
/// swap in an in-memory connector.
pub trait Connector {
    /// Connects to `address` (`host:port`).
    fn connect(&mut self, address: &str) -> Result<Box<dyn Socket>, EnvError>;
}

/// A non-blocking TCP socket.
pub struct TcpSocket {
    stream: TcpStream,
    peer: String,
    closed: bool,
}

impl TcpSocket {
    /// Wraps a connected stream and switches it to non-blocking mode.
    pub fn new(stream: TcpStream) -> Result<Self, EnvError> {
        stream
            .set_nonblocking(true)
            .map_err(|e| EnvError::network(e.to_string()))?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Ok(Self {
            stream,
            peer,
            closed: false,
        })
    }
}

impl Socket for TcpSocket {
    fn send(&mut self, data: &[u8]) -> Result<usize, EnvError> {
        if self.closed {
            return Err(EnvError::closed(&self.peer));
        }
        match self.stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(EnvError::network(format!("{}: {}", self.peer, e))),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EnvError> {
        if self.closed {
            return Err(EnvError::closed(&self.peer));
        }
        match self.stream.read(buf) {
            Ok(0) => {
                self.closed = true;
                Err(EnvError::closed(&self.peer))
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(EnvError::network(format!("{}: {}", self.peer, e))),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            // Peer may already be gone
            if let Err(e) = self.stream.shutdown(Shutdown::Both) {
                debug!("Shutdown of {} failed: {}", self.peer, e);
            }
            self.closed = true;
            debug!("Closed socket to {}", self.peer);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// Connector that opens real TCP connections.
#[derive(Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&mut self, address: &str) -> Result<Box<dyn Socket>, EnvError> {
        let stream = TcpStream::connect(address).map_err(|e| {
            warn!("Connect to {} failed: {}", address, e);
            EnvError::connect_failed(address, e)
        })?;
        debug!("Connected to {}", address);
        Ok(Box::new(TcpSocket::new(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_socket_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut socket = TcpConnector.connect(&address).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut sent = 0;
        while sent < 5 {
            sent += socket.send(&b"hello"[sent..]).unwrap();
        }
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"ok").unwrap();
        let mut got = Vec::new();
        let mut chunk = [0u8; 16];
        while got.len() < 2 {
            let n = socket.recv(&mut chunk).unwrap();
            got.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(got, b"ok");

        socket.close();
        assert!(socket.is_closed());
        assert!(socket.send(b"x").is_err());
    }

    #[test]
    fn test_tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpConnector.connect(&address);
        assert!(matches!(result, Err(EnvError::ConnectFailed { .. })));
    }
}

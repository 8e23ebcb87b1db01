//! In-memory socket pairs for deterministic tests.

use crate::error::EnvError;
use crate::socket::{Connector, Socket};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Channel {
    /// Bytes travelling from side A to side B
    a_to_b: VecDeque<u8>,
    /// Bytes travelling from side B to side A
    b_to_a: VecDeque<u8>,
    closed: bool,
}

/// One end of an in-memory, unbounded socket pair.
///
/// Cloning a `MockSocket` yields another handle to the same end, which
/// lets a test keep a handle after giving the socket away to a worker.
#[derive(Debug, Clone)]
pub struct MockSocket {
    channel: Rc<RefCell<Channel>>,
    side_a: bool,
    label: String,
}

impl MockSocket {
    /// Creates a connected pair `(a, b)`.
    pub fn pair(label: impl Into<String>) -> (MockSocket, MockSocket) {
        let label = label.into();
        let channel = Rc::new(RefCell::new(Channel::default()));
        (
            MockSocket {
                channel: Rc::clone(&channel),
                side_a: true,
                label: label.clone(),
            },
            MockSocket {
                channel,
                side_a: false,
                label,
            },
        )
    }

    /// Number of bytes waiting to be read by this end.
    pub fn pending(&self) -> usize {
        let channel = self.channel.borrow();
        if self.side_a {
            channel.b_to_a.len()
        } else {
            channel.a_to_b.len()
        }
    }

    /// Drains everything waiting for this end.
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut channel = self.channel.borrow_mut();
        let queue = if self.side_a {
            &mut channel.b_to_a
        } else {
            &mut channel.a_to_b
        };
        queue.drain(..).collect()
    }
}

impl Socket for MockSocket {
    fn send(&mut self, data: &[u8]) -> Result<usize, EnvError> {
        let mut channel = self.channel.borrow_mut();
        if channel.closed {
            return Err(EnvError::closed(&self.label));
        }
        let queue = if self.side_a {
            &mut channel.a_to_b
        } else {
            &mut channel.b_to_a
        };
        queue.extend(data.iter().copied());
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EnvError> {
        let mut channel = self.channel.borrow_mut();
        let closed = channel.closed;
        let queue = if self.side_a {
            &mut channel.b_to_a
        } else {
            &mut channel.a_to_b
        };
        if queue.is_empty() && closed {
            return Err(EnvError::closed(&self.label));
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.channel.borrow_mut().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.channel.borrow().closed
    }

    fn peer(&self) -> String {
        self.label.clone()
    }
}

/// Connector handing out in-memory socket pairs.
///
/// The far end of every connection is kept so tests can play the
/// controller side.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    remotes: Rc<RefCell<Vec<(String, MockSocket)>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller-side ends of every connection made so far, with the
    /// address each one was opened to.
    pub fn remotes(&self) -> Vec<(String, MockSocket)> {
        self.remotes.borrow().clone()
    }

    /// Number of remote ends whose connection is still open.
    pub fn open_count(&self) -> usize {
        self.remotes
            .borrow()
            .iter()
            .filter(|(_, s)| !s.is_closed())
            .count()
    }
}

impl Connector for MockConnector {
    fn connect(&mut self, address: &str) -> Result<Box<dyn Socket>, EnvError> {
        let (local, remote) = MockSocket::pair(address);
        self.remotes
            .borrow_mut()
            .push((address.to_string(), remote));
        Ok(Box::new(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_pair_transfers_both_ways() {
        let (mut a, mut b) = MockSocket::pair("test");
        assert_eq!(a.send(b"ping").unwrap(), 4);
        assert_eq!(b.pending(), 4);

        let mut buf = [0u8; 8];
        assert_eq!(b.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(b.recv(&mut buf).unwrap(), 0);

        b.send(b"pong").unwrap();
        assert_eq!(a.read_all(), b"pong");
    }

    #[test]
    fn test_mock_close_is_shared() {
        let (mut a, mut b) = MockSocket::pair("test");
        a.send(b"x").unwrap();
        b.close();
        assert!(a.is_closed());
        assert!(a.send(b"y").is_err());

        // Data in flight is still readable before EOF is reported
        let mut buf = [0u8; 4];
        assert_eq!(b.recv(&mut buf).unwrap(), 1);
        assert!(b.recv(&mut buf).is_err());
    }

    #[test]
    fn test_mock_connector_tracks_remotes() {
        let mut connector = MockConnector::new();
        let mut socket = connector.connect("127.0.0.1:6633").unwrap();
        socket.send(b"hi").unwrap();

        let remotes = connector.remotes();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].0, "127.0.0.1:6633");
        assert_eq!(remotes[0].1.pending(), 2);

        assert_eq!(connector.open_count(), 1);
        socket.close();
        assert_eq!(connector.open_count(), 0);
    }
}

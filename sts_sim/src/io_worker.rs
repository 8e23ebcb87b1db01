//! Raw per-socket IO worker: a send buffer and a peekable receive buffer.

use tracing::debug;

/// Append-only receive accumulator with a consumed-offset cursor.
///
/// `peek` returns everything from the cursor to the end, `consume`
/// advances the cursor. Consumed bytes are dropped lazily when the dead
/// prefix dominates the buffer or the buffer drains completely.
#[derive(Debug, Default, Clone)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly arrived bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.compact();
        self.bytes.extend_from_slice(data);
    }

    /// Returns the unconsumed bytes without consuming them.
    pub fn peek(&self) -> &[u8] {
        &self.bytes[self.cursor..]
    }

    /// Marks `len` bytes as consumed. Consuming past the end clamps.
    pub fn consume(&mut self, len: usize) {
        self.cursor = (self.cursor + len).min(self.bytes.len());
        if self.cursor == self.bytes.len() {
            self.bytes.clear();
            self.cursor = 0;
        }
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compact(&mut self) {
        if self.cursor > 0 && self.cursor * 2 >= self.bytes.len() {
            self.bytes.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

/// Buffers for one socket.
///
/// The worker never touches the socket itself; the IO scheduler drains
/// `send_buf` into the transport and pushes arriving bytes with
/// [`IoWorker::push_receive_data`].
#[derive(Debug, Default)]
pub struct IoWorker {
    /// Peer description, used in log lines
    label: String,

    /// Bytes waiting to be written to the transport
    send_buf: Vec<u8>,

    /// Bytes read from the transport, not yet consumed
    receive_buf: ReceiveBuffer,

    closed: bool,
}

impl IoWorker {
    /// Creates an unlabeled worker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a worker labeled with its peer for logging.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queues bytes for the transport. Sends on a closed worker are dropped.
    pub fn send(&mut self, data: &[u8]) {
        if self.closed {
            debug!("Dropping {} bytes sent to closed worker {}", data.len(), self.label);
            return;
        }
        self.send_buf.extend_from_slice(data);
    }

    /// True while there are bytes waiting for the transport.
    pub fn ready_to_send(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Bytes waiting for the transport.
    pub fn send_buf(&self) -> &[u8] {
        &self.send_buf
    }

    /// Removes `len` bytes the transport accepted from the front of the send buffer.
    pub fn consume_send_buf(&mut self, len: usize) {
        let len = len.min(self.send_buf.len());
        self.send_buf.drain(..len);
    }

    /// Appends bytes that arrived from the transport.
    pub fn push_receive_data(&mut self, data: &[u8]) {
        self.receive_buf.push(data);
    }

    pub fn peek_receive_buf(&self) -> &[u8] {
        self.receive_buf.peek()
    }

    pub fn consume_receive_buf(&mut self, len: usize) {
        self.receive_buf.consume(len);
    }

    /// Closes the worker and discards anything still buffered.
    pub fn close(&mut self) {
        self.closed = true;
        self.send_buf.clear();
        self.receive_buf = ReceiveBuffer::new();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_buffer_peek_does_not_consume() {
        let mut buf = ReceiveBuffer::new();
        buf.push(b"bar");
        assert_eq!(buf.peek(), b"bar");
        assert_eq!(buf.peek(), b"bar");

        buf.push(b"hepp");
        assert_eq!(buf.peek(), b"barhepp");
    }

    #[test]
    fn test_receive_buffer_partial_consume() {
        let mut buf = ReceiveBuffer::new();
        buf.push(b"abcdef");
        buf.consume(2);
        assert_eq!(buf.peek(), b"cdef");
        assert_eq!(buf.len(), 4);

        // Compaction must not change what is visible
        buf.push(b"gh");
        assert_eq!(buf.peek(), b"cdefgh");

        buf.consume(100);
        assert!(buf.is_empty());
        assert_eq!(buf.peek(), b"");
    }

    #[test]
    fn test_send_buffer_ready_flag() {
        let mut worker = IoWorker::new();
        assert!(!worker.ready_to_send());

        worker.send(b"foo");
        assert!(worker.ready_to_send());
        assert_eq!(worker.send_buf(), b"foo");

        worker.consume_send_buf(1);
        assert_eq!(worker.send_buf(), b"oo");

        worker.consume_send_buf(2);
        assert!(!worker.ready_to_send());
    }

    #[test]
    fn test_closed_worker_drops_sends() {
        let mut worker = IoWorker::labeled("c1");
        worker.send(b"foo");
        worker.close();

        assert!(worker.is_closed());
        assert!(!worker.ready_to_send());

        worker.send(b"bar");
        assert!(!worker.ready_to_send());
    }
}

//! Deferred IO worker - a gate that holds socket traffic until released.
//!
//! The harness imposes a total order on otherwise concurrent control
//! traffic by blocking a connection, letting other events happen, and
//! unblocking it later. While blocked nothing reaches the transport and
//! the receive handler is never called; on unblock everything held is
//! released in its original order.
//!
//! ```text
//!   send()  ──► [Blocked] ──► send_queue ──unblock()──► IoWorker::send
//!   socket  ──► IoWorker  ──► [Blocked] ──► held_inbound ──unblock()──► handler
//! ```

use crate::io_worker::{IoWorker, ReceiveBuffer};
use std::collections::VecDeque;
use tracing::debug;

/// Callback invoked when inbound bytes become visible.
///
/// The handler gets the worker itself so it can peek, consume and reply.
/// Bytes it leaves unconsumed are presented again, followed by newer
/// bytes, on the next delivery.
pub type ReceiveHandler = Box<dyn FnMut(&mut DeferredIoWorker)>;

/// Gate state of a deferred worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Blocked,
}

/// Gated wrapper around one [`IoWorker`].
pub struct DeferredIoWorker {
    /// The raw worker that owns the transport buffers
    io_worker: IoWorker,

    state: GateState,

    /// Sends submitted while blocked, in submission order
    send_queue: VecDeque<Vec<u8>>,

    /// Inbound bytes that arrived while blocked, in arrival order
    held_inbound: Vec<u8>,

    /// Bytes visible to the receive handler
    receive_buf: ReceiveBuffer,

    receive_handler: Option<ReceiveHandler>,
}

impl DeferredIoWorker {
    /// Wraps a raw worker. The gate starts open.
    pub fn new(io_worker: IoWorker) -> Self {
        Self {
            io_worker,
            state: GateState::Open,
            send_queue: VecDeque::new(),
            held_inbound: Vec::new(),
            receive_buf: ReceiveBuffer::new(),
            receive_handler: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.state == GateState::Blocked
    }

    /// Stops all traffic through this worker. Idempotent.
    pub fn block(&mut self) {
        if self.state == GateState::Open {
            debug!("Blocking worker {}", self.io_worker.label());
            self.state = GateState::Blocked;
        }
    }

    /// Reopens the gate and releases everything held.
    ///
    /// Queued sends go to the underlying worker in FIFO order. If inbound
    /// bytes arrived while blocked, the receive handler runs exactly once
    /// with all of them visible.
    pub fn unblock(&mut self) {
        if self.state == GateState::Open {
            return;
        }
        debug!(
            "Unblocking worker {} ({} queued sends, {} held bytes)",
            self.io_worker.label(),
            self.send_queue.len(),
            self.held_inbound.len()
        );
        self.state = GateState::Open;

        while let Some(data) = self.send_queue.pop_front() {
            self.io_worker.send(&data);
        }

        if !self.held_inbound.is_empty() {
            let held = std::mem::take(&mut self.held_inbound);
            self.receive_buf.push(&held);
            self.deliver();
        }
    }

    /// Sends `data`, or queues it while blocked.
    pub fn send(&mut self, data: &[u8]) {
        match self.state {
            GateState::Blocked => self.send_queue.push_back(data.to_vec()),
            GateState::Open => self.io_worker.send(data),
        }
    }

    /// Installs the inbound callback, replacing any previous one.
    pub fn set_receive_handler(&mut self, handler: impl FnMut(&mut DeferredIoWorker) + 'static) {
        self.receive_handler = Some(Box::new(handler));
    }

    /// Bytes visible to the receive handler, without consuming them.
    pub fn peek_receive_buf(&self) -> &[u8] {
        self.receive_buf.peek()
    }

    /// Consumes `len` visible bytes.
    pub fn consume_receive_buf(&mut self, len: usize) {
        self.receive_buf.consume(len);
    }

    /// Entry point for bytes arriving from the transport.
    pub fn push_receive_data(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.io_worker.push_receive_data(data);
        self.on_io_worker_readable();
    }

    /// Number of sends held by the gate.
    pub fn queued_sends(&self) -> usize {
        self.send_queue.len()
    }

    /// Number of inbound bytes held by the gate.
    pub fn held_inbound_len(&self) -> usize {
        self.held_inbound.len()
    }

    pub fn io_worker(&self) -> &IoWorker {
        &self.io_worker
    }

    pub fn io_worker_mut(&mut self) -> &mut IoWorker {
        &mut self.io_worker
    }

    /// Closes the underlying worker and drops anything held by the gate.
    pub fn close(&mut self) {
        if !self.send_queue.is_empty() || !self.held_inbound.is_empty() {
            debug!(
                "Closing worker {} with {} queued sends and {} held bytes",
                self.io_worker.label(),
                self.send_queue.len(),
                self.held_inbound.len()
            );
        }
        self.send_queue.clear();
        self.held_inbound.clear();
        self.io_worker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.io_worker.is_closed()
    }

    fn on_io_worker_readable(&mut self) {
        let data = self.io_worker.peek_receive_buf().to_vec();
        self.io_worker.consume_receive_buf(data.len());

        match self.state {
            GateState::Blocked => self.held_inbound.extend_from_slice(&data),
            GateState::Open => {
                self.receive_buf.push(&data);
                self.deliver();
            }
        }
    }

    fn deliver(&mut self) {
        // The handler borrows the worker mutably, so it is taken out for the call
        if let Some(mut handler) = self.receive_handler.take() {
            handler(self);
            // Keep a handler installed from inside the callback
            if self.receive_handler.is_none() {
                self.receive_handler = Some(handler);
            }
        }
    }
}

impl std::fmt::Debug for DeferredIoWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredIoWorker")
            .field("io_worker", &self.io_worker)
            .field("state", &self.state)
            .field("queued_sends", &self.send_queue.len())
            .field("held_inbound", &self.held_inbound.len())
            .field("visible", &self.receive_buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<Vec<u8>>>>, impl FnMut(&mut DeferredIoWorker)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handler = move |worker: &mut DeferredIoWorker| {
            sink.borrow_mut().push(worker.peek_receive_buf().to_vec());
        };
        (seen, handler)
    }

    fn consumer() -> (Rc<RefCell<Vec<Vec<u8>>>>, impl FnMut(&mut DeferredIoWorker)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handler = move |worker: &mut DeferredIoWorker| {
            let data = worker.peek_receive_buf().to_vec();
            worker.consume_receive_buf(data.len());
            sink.borrow_mut().push(data);
        };
        (seen, handler)
    }

    #[test]
    fn test_not_sent_until_permitted() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        worker.block();
        worker.send(b"foo");

        assert!(!worker.io_worker().ready_to_send());
        assert_eq!(worker.queued_sends(), 1);

        worker.unblock();
        assert_eq!(worker.queued_sends(), 0);
        assert_eq!(worker.io_worker().send_buf(), b"foo");

        worker.io_worker_mut().consume_send_buf(3);
        assert!(!worker.io_worker().ready_to_send());
    }

    #[test]
    fn test_sends_flush_in_submission_order() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        worker.block();
        worker.send(b"one,");
        worker.send(b"two,");
        worker.send(b"three");
        assert_eq!(worker.io_worker().send_buf(), b"");

        worker.unblock();
        assert_eq!(worker.io_worker().send_buf(), b"one,two,three");

        // Open gate forwards immediately
        worker.send(b"!");
        assert_eq!(worker.io_worker().send_buf(), b"one,two,three!");
    }

    #[test]
    fn test_not_received_until_permitted() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        let (seen, handler) = recorder();
        worker.block();
        worker.set_receive_handler(handler);

        worker.push_receive_data(b"bar");
        assert!(seen.borrow().is_empty());

        worker.unblock();
        assert_eq!(*seen.borrow(), vec![b"bar".to_vec()]);

        // Unblocked: delivered immediately; the handler did not consume
        worker.push_receive_data(b"hepp");
        assert_eq!(seen.borrow().last().unwrap(), b"barhepp");
    }

    #[test]
    fn test_receive_consume() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        let (seen, handler) = consumer();
        worker.set_receive_handler(handler);
        worker.block();

        worker.push_receive_data(b"bar");
        assert!(seen.borrow().is_empty());

        worker.unblock();
        assert_eq!(*seen.borrow(), vec![b"bar".to_vec()]);

        // Data has been consumed
        worker.push_receive_data(b"hepp");
        assert_eq!(seen.borrow().last().unwrap(), b"hepp");
    }

    #[test]
    fn test_blocked_chunks_delivered_once_concatenated() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        let (seen, handler) = consumer();
        worker.set_receive_handler(handler);
        worker.block();

        worker.push_receive_data(b"a");
        worker.push_receive_data(b"bc");
        worker.push_receive_data(b"def");
        assert_eq!(worker.held_inbound_len(), 6);

        worker.unblock();
        assert_eq!(*seen.borrow(), vec![b"abcdef".to_vec()]);

        // A second unblock with nothing held does not call the handler again
        worker.block();
        worker.unblock();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_block_is_idempotent() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        worker.block();
        worker.block();
        assert!(worker.is_blocked());
        worker.send(b"x");

        worker.unblock();
        assert_eq!(worker.state(), GateState::Open);
        assert_eq!(worker.io_worker().send_buf(), b"x");
    }

    #[test]
    fn test_handler_can_reply() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        worker.set_receive_handler(|w: &mut DeferredIoWorker| {
            let len = w.peek_receive_buf().len();
            w.consume_receive_buf(len);
            w.send(b"ack");
        });

        worker.push_receive_data(b"req");
        assert_eq!(worker.io_worker().send_buf(), b"ack");
    }

    #[test]
    fn test_close_drops_held_traffic() {
        let mut worker = DeferredIoWorker::new(IoWorker::new());
        worker.block();
        worker.send(b"foo");
        worker.push_receive_data(b"bar");

        worker.close();
        assert!(worker.is_closed());
        assert_eq!(worker.queued_sends(), 0);
        assert_eq!(worker.held_inbound_len(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Block,
        Unblock,
        Send(Vec<u8>),
        Arrive(Vec<u8>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Block),
            Just(Op::Unblock),
            proptest::collection::vec(any::<u8>(), 1..8).prop_map(Op::Send),
            proptest::collection::vec(any::<u8>(), 1..8).prop_map(Op::Arrive),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn property_no_byte_lost_or_duplicated(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut worker = DeferredIoWorker::new(IoWorker::new());
            let (seen, handler) = consumer();
            worker.set_receive_handler(handler);

            let mut sent = Vec::new();
            let mut arrived = Vec::new();
            for op in ops {
                match op {
                    Op::Block => worker.block(),
                    Op::Unblock => worker.unblock(),
                    Op::Send(data) => {
                        sent.extend_from_slice(&data);
                        worker.send(&data);
                    }
                    Op::Arrive(data) => {
                        arrived.extend_from_slice(&data);
                        let calls_before = seen.borrow().len();
                        let blocked = worker.is_blocked();
                        worker.push_receive_data(&data);
                        if blocked {
                            prop_assert_eq!(seen.borrow().len(), calls_before);
                        }
                    }
                }
                // Transport only ever sees a prefix of the submissions
                prop_assert!(sent.starts_with(worker.io_worker().send_buf()));
            }
            worker.unblock();

            prop_assert_eq!(worker.io_worker().send_buf(), &sent[..]);
            let delivered: Vec<u8> = seen.borrow().concat();
            prop_assert_eq!(delivered, arrived);
        }
    }
}

//! IO scheduling context: the single-threaded cooperative event loop.
//!
//! `IoMaster` owns every socket opened during a run and pairs each one
//! with a [`DeferredIoWorker`]. A dispatch pass ([`IoMaster::poll_once`])
//! flushes pending sends, reads what has arrived, and fires due timers,
//! one callback at a time.
//!
//! It is also the run's clock: `delay()` advances a logical clock by
//! running dispatch passes, never by sleeping, so the same inputs always
//! produce the same sequence of callbacks.

use crate::config::IoConfig;
use crate::deferred_io::DeferredIoWorker;
use crate::io_worker::IoWorker;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;
use sts_env::{EnvError, SimClock, Socket};
use tracing::{debug, warn};

/// Shared handle to a gated worker created by the IoMaster.
pub type WorkerHandle = Rc<RefCell<DeferredIoWorker>>;

const READ_CHUNK: usize = 4096;

/// A worker paired with the socket it drains into.
struct Registration {
    worker: WorkerHandle,
    socket: Box<dyn Socket>,
}

struct Timer {
    deadline: Duration,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        (self.deadline, self.seq) == (other.deadline, other.seq)
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

struct IoState {
    /// Current logical time
    now: Duration,

    registrations: Vec<Rc<RefCell<Registration>>>,

    /// Min-heap of pending timers, ties broken by insertion order
    timers: BinaryHeap<Reverse<Timer>>,

    next_timer_seq: u64,

    /// Permutes dispatch order when a seed is configured
    rng: Option<ChaCha8Rng>,

    closed: bool,
}

/// The IO scheduling context for one simulation run.
pub struct IoMaster {
    config: IoConfig,
    state: RefCell<IoState>,
}

impl IoMaster {
    /// Creates a new scheduling context at logical time zero.
    pub fn new(config: IoConfig) -> Self {
        let rng = config.dispatch_seed.map(ChaCha8Rng::seed_from_u64);
        Self {
            config,
            state: RefCell::new(IoState {
                now: Duration::ZERO,
                registrations: Vec::new(),
                timers: BinaryHeap::new(),
                next_timer_seq: 0,
                rng,
                closed: false,
            }),
        }
    }

    /// Creates an Rc-wrapped context for sharing as a clock.
    pub fn shared(config: IoConfig) -> Rc<Self> {
        Rc::new(Self::new(config))
    }

    /// Binds a socket to a fresh gated worker.
    pub fn create_worker(&self, socket: Box<dyn Socket>) -> Result<WorkerHandle, EnvError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(EnvError::ContextError(
                "IoMaster is closed; bootstrap a new run".to_string(),
            ));
        }
        let peer = socket.peer();
        debug!("Creating worker for {}", peer);
        let worker = Rc::new(RefCell::new(DeferredIoWorker::new(IoWorker::labeled(peer))));
        state.registrations.push(Rc::new(RefCell::new(Registration {
            worker: Rc::clone(&worker),
            socket,
        })));
        Ok(worker)
    }

    /// Schedules `callback` to run once logical time has advanced by `delay`.
    pub fn call_later(&self, delay: Duration, callback: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if state.closed {
            debug!("Ignoring timer scheduled on a closed IoMaster");
            return;
        }
        let seq = state.next_timer_seq;
        state.next_timer_seq += 1;
        let deadline = state.now.saturating_add(delay);
        state.timers.push(Reverse(Timer {
            deadline,
            seq,
            callback: Box::new(callback),
        }));
    }

    /// Runs one dispatch pass: pumps every worker, then fires due timers.
    ///
    /// A worker whose callback is currently executing (re-entrant call from
    /// inside a handler) is skipped for this pass.
    pub fn poll_once(&self) {
        let registrations = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            let mut order: Vec<_> = state.registrations.iter().cloned().collect();
            if let Some(rng) = state.rng.as_mut() {
                order.shuffle(rng);
            }
            order
        };

        let mut finished = Vec::new();
        for registration in &registrations {
            let Ok(mut registration_ref) = registration.try_borrow_mut() else {
                continue;
            };
            if !pump(&mut registration_ref) {
                finished.push(Rc::clone(registration));
            }
        }

        if !finished.is_empty() {
            self.state
                .borrow_mut()
                .registrations
                .retain(|r| !finished.iter().any(|f| Rc::ptr_eq(f, r)));
        }

        self.fire_due_timers();
    }

    /// Pumps the loop for `duration` of logical time.
    pub fn run_for(&self, duration: Duration) {
        self.delay(duration);
    }

    /// Closes every socket and worker and drops pending timers.
    ///
    /// After this the context no longer acts as a clock: `delay` returns
    /// immediately and no new workers can be created.
    pub fn close_all(&self) -> usize {
        let (registrations, dropped_timers) = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            let timers = state.timers.len();
            state.timers.clear();
            (std::mem::take(&mut state.registrations), timers)
        };

        let closed = registrations.len();
        for registration in registrations {
            match registration.try_borrow_mut() {
                Ok(mut registration) => {
                    registration.socket.close();
                    if let Ok(mut worker) = registration.worker.try_borrow_mut() {
                        worker.close();
                    }
                }
                Err(_) => warn!("Worker busy during close_all; its socket is released on drop"),
            }
        }
        debug!(
            "IoMaster closed {} workers, dropped {} timers",
            closed, dropped_timers
        );
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    fn advance(&self, step: Duration) {
        self.state.borrow_mut().now += step;
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.state
            .borrow()
            .timers
            .peek()
            .map(|Reverse(timer)| timer.deadline)
    }

    fn fire_due_timers(&self) {
        loop {
            let timer = {
                let mut state = self.state.borrow_mut();
                let now = state.now;
                let due = matches!(state.timers.peek(), Some(Reverse(timer)) if timer.deadline <= now);
                if due {
                    state.timers.pop().map(|Reverse(timer)| timer)
                } else {
                    None
                }
            };
            match timer {
                // State borrow is released before the callback runs
                Some(timer) => (timer.callback)(),
                None => break,
            }
        }
    }
}

impl SimClock for IoMaster {
    fn now(&self) -> Duration {
        self.state.borrow().now
    }

    fn delay(&self, duration: Duration) {
        if self.is_closed() {
            debug!("delay({:?}) on closed IoMaster ignored", duration);
            return;
        }
        let target = self.now().saturating_add(duration);
        loop {
            self.poll_once();
            let now = self.now();
            if now >= target || self.is_closed() {
                break;
            }
            let remaining = target - now;
            let mut step = if self.config.tick().is_zero() {
                remaining
            } else {
                self.config.tick().min(remaining)
            };
            if let Some(deadline) = self.next_deadline() {
                if deadline > now {
                    step = step.min(deadline - now);
                }
            }
            self.advance(step);
        }
    }
}

/// Moves bytes between one worker and its socket.
///
/// Returns false once the registration is finished (worker closed or
/// socket failed) and should be dropped.
fn pump(registration: &mut Registration) -> bool {
    let Registration { worker, socket } = registration;
    let Ok(mut worker) = worker.try_borrow_mut() else {
        return true;
    };

    if worker.is_closed() {
        socket.close();
        return false;
    }

    while worker.io_worker().ready_to_send() {
        match socket.send(worker.io_worker().send_buf()) {
            Ok(0) => break,
            Ok(n) => worker.io_worker_mut().consume_send_buf(n),
            Err(e) => {
                warn!("Send to {} failed: {}", socket.peer(), e);
                worker.close();
                socket.close();
                return false;
            }
        }
    }

    let mut buf = [0u8; READ_CHUNK];
    loop {
        match socket.recv(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                worker.push_receive_data(&buf[..n]);
                if worker.is_closed() {
                    socket.close();
                    return false;
                }
            }
            Err(EnvError::ConnectionClosed(peer)) => {
                debug!("Peer {} closed the connection", peer);
                worker.close();
                socket.close();
                return false;
            }
            Err(e) => {
                warn!("Receive from {} failed: {}", socket.peer(), e);
                worker.close();
                socket.close();
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use sts_env::MockSocket;

    fn master() -> IoMaster {
        IoMaster::new(IoConfig::default())
    }

    #[test]
    fn test_logical_clock_advances_only_by_delay() {
        let io = master();
        assert_eq!(io.now(), Duration::ZERO);

        io.poll_once();
        assert_eq!(io.now(), Duration::ZERO);

        io.delay(Duration::from_millis(35));
        assert_eq!(io.now(), Duration::from_millis(35));

        io.delay(Duration::ZERO);
        assert_eq!(io.now(), Duration::from_millis(35));
    }

    #[test]
    fn test_worker_pumps_through_socket() {
        let io = master();
        let (local, mut remote) = MockSocket::pair("c1");
        let worker = io.create_worker(Box::new(local)).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        worker
            .borrow_mut()
            .set_receive_handler(move |w: &mut DeferredIoWorker| {
                let data = w.peek_receive_buf().to_vec();
                w.consume_receive_buf(data.len());
                sink.borrow_mut().extend(data);
            });

        worker.borrow_mut().send(b"hello");
        io.poll_once();
        assert_eq!(remote.read_all(), b"hello");

        remote.send(b"world").unwrap();
        io.poll_once();
        assert_eq!(*seen.borrow(), b"world");
    }

    #[test]
    fn test_blocked_worker_holds_traffic_across_passes() {
        let io = master();
        let (local, mut remote) = MockSocket::pair("c1");
        let worker = io.create_worker(Box::new(local)).unwrap();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        worker
            .borrow_mut()
            .set_receive_handler(move |_: &mut DeferredIoWorker| *counter.borrow_mut() += 1);

        worker.borrow_mut().block();
        worker.borrow_mut().send(b"flow_mod");
        remote.send(b"echo").unwrap();
        io.delay(Duration::from_millis(100));

        assert_eq!(remote.pending(), 0);
        assert_eq!(*calls.borrow(), 0);

        worker.borrow_mut().unblock();
        io.poll_once();
        assert_eq!(remote.read_all(), b"flow_mod");
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let io = Rc::new(master());
        let fired = Rc::new(RefCell::new(Vec::new()));

        for (delay_ms, tag) in [(30, "c"), (10, "a"), (10, "b")] {
            let fired = Rc::clone(&fired);
            io.call_later(Duration::from_millis(delay_ms), move || {
                fired.borrow_mut().push(tag)
            });
        }
        assert_eq!(io.pending_timers(), 3);

        io.delay(Duration::from_millis(20));
        assert_eq!(*fired.borrow(), vec!["a", "b"]);

        io.delay(Duration::from_millis(20));
        assert_eq!(*fired.borrow(), vec!["a", "b", "c"]);
        assert_eq!(io.pending_timers(), 0);
    }

    #[test]
    fn test_far_future_timer_stays_pending() {
        let io = master();
        io.delay(Duration::from_millis(1));
        let fired = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&fired);
        io.call_later(Duration::MAX, move || *flag.borrow_mut() = true);

        io.run_for(Duration::from_millis(1));
        assert!(!*fired.borrow());
        assert_eq!(io.pending_timers(), 1);
        assert_eq!(io.now(), Duration::from_millis(2));
    }

    #[test]
    fn test_timer_may_delay_reentrantly() {
        let io = Rc::new(master());
        let inner = Rc::clone(&io);
        let observed = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&observed);

        io.call_later(Duration::from_millis(5), move || {
            inner.delay(Duration::from_millis(5));
            *slot.borrow_mut() = Some(inner.now());
        });
        io.delay(Duration::from_millis(5));

        assert_eq!(*observed.borrow(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_peer_close_drops_worker() {
        let io = master();
        let (local, mut remote) = MockSocket::pair("c1");
        let worker = io.create_worker(Box::new(local)).unwrap();
        assert_eq!(io.worker_count(), 1);

        remote.close();
        io.poll_once();

        assert_eq!(io.worker_count(), 0);
        assert!(worker.borrow().is_closed());
    }

    #[test]
    fn test_close_all_releases_everything() {
        let io = master();
        let (a, remote_a) = MockSocket::pair("c1");
        let (b, remote_b) = MockSocket::pair("c2");
        let wa = io.create_worker(Box::new(a)).unwrap();
        let _wb = io.create_worker(Box::new(b)).unwrap();
        io.call_later(Duration::from_secs(1), || {});

        assert_eq!(io.close_all(), 2);
        assert!(io.is_closed());
        assert!(remote_a.is_closed());
        assert!(remote_b.is_closed());
        assert!(wa.borrow().is_closed());
        assert_eq!(io.pending_timers(), 0);

        // No longer a clock, no longer a worker factory
        let before = io.now();
        io.delay(Duration::from_secs(5));
        assert_eq!(io.now(), before);
        let (c, _) = MockSocket::pair("c3");
        assert!(io.create_worker(Box::new(c)).is_err());
    }

    #[test]
    fn test_seeded_dispatch_is_deterministic() {
        fn arrival_order(seed: u64) -> Vec<usize> {
            let io = IoMaster::new(IoConfig {
                dispatch_seed: Some(seed),
                ..IoConfig::default()
            });
            let order = Rc::new(RefCell::new(Vec::new()));
            let mut remotes = Vec::new();
            for i in 0..6 {
                let (local, remote) = MockSocket::pair(format!("c{i}"));
                let worker = io.create_worker(Box::new(local)).unwrap();
                let order = Rc::clone(&order);
                worker
                    .borrow_mut()
                    .set_receive_handler(move |_: &mut DeferredIoWorker| order.borrow_mut().push(i));
                remotes.push(remote);
            }
            for remote in &mut remotes {
                remote.send(b"x").unwrap();
            }
            io.poll_once();
            let result = order.borrow().clone();
            result
        }

        assert_eq!(arrival_order(42), arrival_order(42));
        let mut sorted = arrival_order(42);
        sorted.sort();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
    }
}

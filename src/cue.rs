//! The cue gate: how the clock tells the ring "a new minute just started".
//!
//! The gate holds at most one pending cue. Any number of `signal()` calls
//! before the animation thread next waits collapse into a single cycle.
//!
//! ## Rust concepts
//! - `Mutex` + `Condvar` for a blocking wait that another thread releases
//! - `while` loop around `Condvar::wait` to absorb spurious wake-ups
//! - `Arc` to share the gate between the producer and consumer threads

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct GateState {
    pending: bool,
    closed: bool,
}

/// Why `wait_for_signal` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// A cue was posted. Start a cycle.
    Cue,
    /// The gate was closed and no cue was pending.
    Closed,
}

/// One-shot, coalescing wake-up between the minute producer and the ring.
#[derive(Debug, Default)]
pub struct CueGate {
    state: Mutex<GateState>,
    ready: Condvar,
}

impl CueGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a cue. Never blocks for longer than the internal lock is held.
    /// Returns `false` if a cue was already pending (the two coalesce).
    pub fn signal(&self) -> bool {
        let mut state = self.lock();
        let fresh = !state.pending;
        state.pending = true;
        drop(state);

        if fresh {
            tracing::debug!("cue posted");
        } else {
            tracing::debug!("cue already pending, coalescing");
        }
        self.ready.notify_one();
        fresh
    }

    /// Block until a cue has been posted since the last call returned, then
    /// consume it. A pending cue is delivered even after `close()`.
    pub fn wait_for_signal(&self) -> Wake {
        let mut state = self.lock();
        while !state.pending && !state.closed {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        if state.pending {
            state.pending = false;
            Wake::Cue
        } else {
            Wake::Closed
        }
    }

    /// Drop a cue that arrived while a cycle was running.
    /// Returns `true` if one was dropped.
    pub fn discard_pending(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.pending, false)
    }

    /// Whether a cue is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Release any waiter for good. Used on shutdown.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The state is two flags; a panicking holder can't leave it torn.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Minute producer ─────────────────────────────────────────────────

/// Time left until the next wall-clock minute boundary.
///
/// Exactly on a boundary this is a full minute, so a producer that wakes
/// right on time never fires twice for the same boundary.
pub fn until_next_minute(since_epoch: Duration) -> Duration {
    let into_minute = since_epoch.as_millis() % MINUTE.as_millis();
    MINUTE - Duration::from_millis(into_minute as u64)
}

/// Background thread that signals the gate at the top of every minute.
///
/// This is a stand-in for the clock's own time keeping. It reads the system
/// clock, so NTP steps are picked up at the next boundary.
pub struct MinuteTicker {
    handle: JoinHandle<()>,
}

impl MinuteTicker {
    pub fn spawn(gate: Arc<CueGate>) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("minute-cue".to_string())
            .spawn(move || minute_loop(&gate))?;
        Ok(Self { handle })
    }

    /// Wait for the thread to notice the gate closed.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("minute cue thread panicked");
        }
    }
}

fn minute_loop(gate: &CueGate) {
    tracing::info!("minute cue producer started");

    while !gate.is_closed() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let wait = until_next_minute(now);
        tracing::trace!("next minute boundary in {}ms", wait.as_millis());

        // Sleep in short slices so shutdown isn't held up for a minute.
        let deadline = Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() || gate.is_closed() {
                break;
            }
            thread::sleep(left.min(Duration::from_millis(250)));
        }

        if gate.is_closed() {
            break;
        }
        gate.signal();
    }

    tracing::info!("minute cue producer stopped");
}

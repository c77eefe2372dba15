//! One-shot stop gate shared between the lifecycle controller and its worker.
//!
//! The gate moves `Armed -> Signaled -> Released` or `Armed -> Released` and
//! never back. Every operation is infallible and safe to call from any thread
//! in any state; signaling a released gate is a no-op.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Armed,
    Signaled,
    Released,
}

#[derive(Debug)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    /// Create an armed gate.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Armed),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// True once the gate has been signaled or released.
    pub fn is_stopped(&self) -> bool {
        self.state() != GateState::Armed
    }

    /// Block until the gate is signaled or released.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while *state == GateState::Armed {
            self.changed.wait(&mut state);
        }
    }

    /// Block for at most `timeout`. Returns whether a stop was observed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state == GateState::Armed {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state != GateState::Armed
    }

    /// Request a stop. Only the first call on an armed gate has an effect.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        if *state == GateState::Armed {
            *state = GateState::Signaled;
            self.changed.notify_all();
        }
    }

    /// Terminal transition. Wakes any remaining waiters.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if *state != GateState::Released {
            *state = GateState::Released;
            self.changed.notify_all();
        }
    }

    /// Wait-only view handed to the worker.
    pub fn waiter(self: &Arc<Self>) -> StopWaiter {
        StopWaiter {
            gate: Arc::clone(self),
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// The "block until asked to stop" callback given to a worker.
///
/// Cloneable so the worker can hand it to its own helper threads; it exposes
/// no way to signal or release the gate.
#[derive(Debug, Clone)]
pub struct StopWaiter {
    gate: Arc<Gate>,
}

impl StopWaiter {
    pub fn wait(&self) {
        self.gate.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.gate.wait_timeout(timeout)
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.is_stopped()
    }
}

/// Releases the gate when dropped, so every exit path of a run tears it down.
pub(crate) struct ReleaseOnDrop(pub(crate) Arc<Gate>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}

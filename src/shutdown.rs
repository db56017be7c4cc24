//! Process-wide shutdown coordination.
//!
//! One explicit state value replaces ad-hoc boolean flags: workers only get a
//! read-only cancellation check, and all transitions go through a single
//! entry point guarded against concurrent double-transition.
//!
//! State machine: `Running -> GracefulRequested -> Terminated`, plus the
//! escape hatch `GracefulRequested -> ForceTerminated` on a second interrupt.
//! Forced termination is only reachable while a graceful request is pending.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    GracefulRequested,
    Terminated,
    ForceTerminated,
}

const RUNNING: u8 = 0;
const GRACEFUL: u8 = 1;
const TERMINATED: u8 = 2;
const FORCED: u8 = 3;

/// What the caller of [`ShutdownController::request_interrupt`] must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Cancellation flag is now set; let the loops drain and tear down.
    Graceful,
    /// Second interrupt: terminate the process immediately, skipping cleanup.
    Force,
    /// Shutdown already completed; nothing to do.
    Ignored,
}

#[derive(Debug, Default)]
pub struct ShutdownController {
    state: AtomicU8,
}

impl ShutdownController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => ShutdownState::Running,
            GRACEFUL => ShutdownState::GracefulRequested,
            TERMINATED => ShutdownState::Terminated,
            _ => ShutdownState::ForceTerminated,
        }
    }

    /// The single transition entry point for external interrupts.
    ///
    /// First interrupt moves `Running -> GracefulRequested`. A second
    /// interrupt while the first is still pending moves to `ForceTerminated`
    /// and tells the caller to exit immediately. Compare-exchange guards make
    /// concurrent interrupts resolve to exactly one action each.
    pub fn request_interrupt(&self) -> InterruptAction {
        if self
            .state
            .compare_exchange(RUNNING, GRACEFUL, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return InterruptAction::Graceful;
        }
        if self
            .state
            .compare_exchange(GRACEFUL, FORCED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return InterruptAction::Force;
        }
        InterruptAction::Ignored
    }

    /// Read-only cancellation check for the relay loops. True once a graceful
    /// request (or anything later) is pending.
    pub fn cancel_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    /// Normal-path completion, after both relay loops have been joined and
    /// teardown has run. No-op once forced termination was requested.
    pub fn mark_terminated(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, TERMINATED, Ordering::SeqCst, Ordering::SeqCst);
        let _ = self
            .state
            .compare_exchange(GRACEFUL, TERMINATED, Ordering::SeqCst, Ordering::SeqCst);
    }
}

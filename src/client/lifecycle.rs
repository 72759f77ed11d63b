//! One-shot `Running → Closed` lifecycle cell.

use std::sync::atomic::{AtomicU8, Ordering};

/// Client lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Accepting writes and (re)dialing.
    Running = 0,
    /// Closed for good.
    Closed = 1,
}

/// Atomic lifecycle flag shared between the caller and the supervisor.
#[derive(Debug, Default)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    /// Current state.
    pub fn state(&self) -> LifecycleState {
        if self.0.load(Ordering::Acquire) == LifecycleState::Closed as u8 {
            LifecycleState::Closed
        } else {
            LifecycleState::Running
        }
    }

    /// True once [`Lifecycle::close`] has succeeded.
    pub fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }

    /// Move to `Closed`. Returns true only for the call that made the transition.
    pub fn close(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

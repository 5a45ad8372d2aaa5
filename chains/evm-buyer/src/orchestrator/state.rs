use core_logic::OperationError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Lifecycle of the single operation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Cancelling,
    Cleaning,
    Terminated,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Running | RunState::Cancelling | RunState::Cleaning
        )
    }
}

#[derive(Debug)]
struct ControlState {
    state: RunState,
    cancel: CancellationToken,
}

/// Mutex-guarded run slot. At most one [`RunGuard`] exists at a time.
#[derive(Debug)]
pub(crate) struct RunControl {
    inner: Mutex<ControlState>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: RunState::Idle,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

impl RunControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot, or fail with `AlreadyRunning`.
    pub fn begin(&self) -> Result<RunGuard<'_>, OperationError> {
        let mut inner = self.lock();
        if inner.state.is_active() {
            return Err(OperationError::AlreadyRunning);
        }
        inner.state = RunState::Running;
        inner.cancel = CancellationToken::new();
        Ok(RunGuard {
            control: self,
            token: inner.cancel.clone(),
        })
    }

    /// Request cooperative cancellation. Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != RunState::Running {
            return false;
        }
        inner.state = RunState::Cancelling;
        inner.cancel.cancel();
        true
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    pub fn set_state(&self, state: RunState) {
        self.lock().state = state;
    }
}

/// Held for the duration of a run; returns the slot to `Terminated` on drop.
#[derive(Debug)]
pub(crate) struct RunGuard<'a> {
    control: &'a RunControl,
    token: CancellationToken,
}

impl RunGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn enter_cleanup(&self) {
        self.control.set_state(RunState::Cleaning);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.control.set_state(RunState::Terminated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_slot() {
        let control = RunControl::default();
        let guard = control.begin().unwrap();
        assert!(matches!(control.begin(), Err(OperationError::AlreadyRunning)));
        drop(guard);
        assert_eq!(control.state(), RunState::Terminated);
        assert!(control.begin().is_ok());
    }

    #[test]
    fn test_stop_cancels_current_token_only() {
        let control = RunControl::default();
        assert!(!control.stop());

        let guard = control.begin().unwrap();
        assert!(control.stop());
        assert!(guard.token().is_cancelled());
        assert_eq!(control.state(), RunState::Cancelling);
        drop(guard);

        let next = control.begin().unwrap();
        assert!(!next.token().is_cancelled());
    }

    #[test]
    fn test_cleanup_still_blocks_new_runs() {
        let control = RunControl::default();
        let guard = control.begin().unwrap();
        guard.enter_cleanup();
        assert!(control.state().is_active());
        assert!(!control.stop());
        assert!(control.begin().is_err());
    }
}

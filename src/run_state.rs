//! Shared run flag between the command reader and the acquisition loop.
//!
//! The flag starts out `running` and can only ever move to `stopped`. The
//! acquisition loop samples it at repetition and phase boundaries; the command
//! reader (or the loop itself, on a fatal error) clears it.

use std::sync::{Arc, PoisonError, RwLock};

/// Cloneable handle to the process-wide run flag.
///
/// Readers take the shared side of a reader/writer lock, so any number of
/// polls can run concurrently with a rare exclusive stop.
#[derive(Clone, Debug)]
pub struct RunState {
    running: Arc<RwLock<bool>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Create a new flag in the `running` state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(RwLock::new(true)),
        }
    }

    /// True until someone calls [`RunState::stop`].
    pub fn is_running(&self) -> bool {
        // A plain bool cannot be observed half-written, so a poisoned lock
        // still holds a meaningful value.
        *self.running.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a stop. Idempotent; there is no way back to `running`.
    pub fn stop(&self) {
        let mut running = self.running.write().unwrap_or_else(PoisonError::into_inner);
        if *running {
            tracing::debug!("run state -> stopped");
        }
        *running = false;
    }
}

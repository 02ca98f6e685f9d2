//! Message-bus (GPIB) instrument adapter
//!
//! [`MessageBusDevice`] implements [`Transport`] on top of a [`BusSession`],
//! the small set of primitives a GPIB driver offers. Keeping the primitives
//! behind a trait lets the close sequence run unchanged against VISA and the
//! simulated laboratory.

use super::{InstrumentRole, Transport, WaitOutcome};
use crate::error::{AppResult, DaqError};
use std::time::Duration;
use tracing::{debug, warn};

/// Reset command sent while closing.
pub const RESET_COMMAND: &str = "*rst";

/// Raw operations of one addressed device on a message bus.
pub trait BusSession: Send {
    /// Send a complete message.
    fn send(&mut self, message: &[u8]) -> AppResult<usize>;

    /// Receive into `buf`, returning the number of bytes delivered.
    fn receive(&mut self, buf: &mut [u8]) -> AppResult<usize>;

    /// Selected device clear.
    fn device_clear(&mut self) -> AppResult<()>;

    /// Return the device to local control and release the lock-out.
    fn go_to_local(&mut self) -> AppResult<()>;

    /// Wait for the device's service request line.
    fn wait_for_service_request(&mut self, timeout: Duration) -> AppResult<WaitOutcome>;
}

/// Transport over a message-bus session.
pub struct MessageBusDevice<S: BusSession> {
    role: InstrumentRole,
    session: S,
    reset_pause: Duration,
}

impl<S: BusSession> MessageBusDevice<S> {
    /// Wrap an open session.
    ///
    /// # Arguments
    /// * `role` - Instrument the session is addressed to
    /// * `session` - Open driver session
    /// * `reset_pause` - Settle time after `*rst` during close
    pub fn new(role: InstrumentRole, session: S, reset_pause: Duration) -> Self {
        Self {
            role,
            session,
            reset_pause,
        }
    }
}

impl<S: BusSession> Transport for MessageBusDevice<S> {
    fn role(&self) -> InstrumentRole {
        self.role
    }

    fn write(&mut self, command: &str) -> AppResult<usize> {
        debug!(device = %self.role, command, "write");
        self.session.send(command.as_bytes()).map_err(|e| {
            warn!(device = %self.role, command, error = %e, "write failed");
            e
        })
    }

    fn read(&mut self, max_bytes: usize) -> AppResult<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        let count = self.session.receive(&mut buf).map_err(|e| {
            warn!(device = %self.role, error = %e, "read failed");
            e
        })?;
        buf.truncate(count.min(max_bytes));
        debug!(device = %self.role, bytes = buf.len(), "read");
        Ok(buf)
    }

    fn wait_for_service_request(&mut self, timeout: Duration) -> AppResult<WaitOutcome> {
        self.session.wait_for_service_request(timeout)
    }

    /// Device clear, `*rst`, pause, go-to-local; every step is attempted even
    /// when an earlier one failed.
    fn close(mut self: Box<Self>) -> AppResult<()> {
        let role = self.role;
        let mut failures = Vec::new();

        if let Err(e) = self.session.device_clear() {
            warn!(device = %role, error = %e, "device clear failed");
            failures.push(e);
        }
        if let Err(e) = self.session.send(RESET_COMMAND.as_bytes()) {
            warn!(device = %role, error = %e, "reset failed");
            failures.push(e);
        }
        std::thread::sleep(self.reset_pause);
        if let Err(e) = self.session.go_to_local() {
            warn!(device = %role, error = %e, "go to local failed");
            failures.push(e);
        }

        debug!(device = %role, "closed");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(failures))
        }
    }
}

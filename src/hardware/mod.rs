//! Bench instruments
//!
//! [`InstrumentRack`] owns the open transports from acquisition to teardown.
//! The per-instrument modules wrap a borrowed transport with the command
//! vocabulary of that instrument.

pub mod mock;
pub mod power_supply;
pub mod voltmeter;
pub mod waveform_source;

pub use power_supply::{ChannelReadings, PowerSupply};
pub use voltmeter::Voltmeter;
pub use waveform_source::WaveformSource;

use crate::adapters::{query, InstrumentOpener, InstrumentRole, Transport};
use crate::config::InstrumentDefinition;
use crate::error::{AppResult, DaqError};
use tracing::{debug, info, warn};

/// Reply size for short status/measurement queries.
pub(crate) const STATUS_REPLY_BYTES: usize = 256;

/// Write one command, logging (not propagating) a failure.
///
/// Instrument commands are never retried; a failed write is a diagnostic.
pub(crate) fn send(transport: &mut dyn Transport, command: &str) -> bool {
    match transport.write(command) {
        Ok(_) => true,
        Err(e) => {
            warn!(device = %transport.role(), command, error = %e, "command not delivered");
            false
        }
    }
}

/// Query `system:error?` and log the answer.
pub(crate) fn log_error_status(transport: &mut dyn Transport) {
    match query(transport, "system:error?", STATUS_REPLY_BYTES) {
        Ok(status) => info!(device = %transport.role(), %status, "error status"),
        Err(e) => warn!(device = %transport.role(), error = %e, "error status unavailable"),
    }
}

/// Open instrument handles, in acquisition order.
///
/// Handles are released in reverse acquisition order by [`InstrumentRack::close_all`],
/// or on drop if the rack is abandoned on an error path. Only handles that
/// were actually opened are closed.
#[derive(Default)]
pub struct InstrumentRack {
    handles: Vec<Box<dyn Transport>>,
}

impl InstrumentRack {
    /// Empty rack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one instrument and take ownership of its handle.
    pub fn acquire(
        &mut self,
        opener: &dyn InstrumentOpener,
        role: InstrumentRole,
        definition: &InstrumentDefinition,
    ) -> AppResult<()> {
        if self.contains(role) {
            return Err(DaqError::instrument(role.to_string(), "already open"));
        }
        let handle = opener.open(role, definition)?;
        info!(device = %role, resource = %definition.resource, "opened");
        self.handles.push(handle);
        Ok(())
    }

    /// Whether `role` has an open handle.
    pub fn contains(&self, role: InstrumentRole) -> bool {
        self.handles.iter().any(|h| h.role() == role)
    }

    /// Roles currently open, in acquisition order.
    pub fn roles(&self) -> Vec<InstrumentRole> {
        self.handles.iter().map(|h| h.role()).collect()
    }

    /// Borrow the handle for `role`.
    pub fn get(&mut self, role: InstrumentRole) -> AppResult<&mut dyn Transport> {
        match self.handles.iter_mut().find(|h| h.role() == role) {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(DaqError::instrument(role.to_string(), "not open")),
        }
    }

    /// Power supply view.
    pub fn power_supply(&mut self) -> AppResult<PowerSupply<'_>> {
        self.get(InstrumentRole::PowerSupply).map(PowerSupply::new)
    }

    /// Voltmeter view.
    pub fn voltmeter(&mut self) -> AppResult<Voltmeter<'_>> {
        self.get(InstrumentRole::Voltmeter).map(Voltmeter::new)
    }

    /// Waveform source view.
    pub fn waveform_source(&mut self) -> AppResult<WaveformSource<'_>> {
        self.get(InstrumentRole::WaveformSource).map(WaveformSource::new)
    }

    /// Close every handle, last opened first.
    ///
    /// Each close runs even if an earlier one failed. Failures are logged and
    /// returned for reporting; they never interrupt the walk.
    pub fn close_all(&mut self) -> Vec<DaqError> {
        let mut failures = Vec::new();
        while let Some(handle) = self.handles.pop() {
            let role = handle.role();
            match handle.close() {
                Ok(()) => debug!(device = %role, "released"),
                Err(e) => {
                    warn!(device = %role, error = %e, "close failed");
                    failures.push(e);
                }
            }
        }
        failures
    }
}

impl Drop for InstrumentRack {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            warn!("instrument rack dropped with open handles, closing");
            self.close_all();
        }
    }
}

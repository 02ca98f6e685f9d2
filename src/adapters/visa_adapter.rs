//! VISA session for GPIB message-bus instruments
//!
//! Wraps the visa-rs crate. Resource names may be full VISA resource strings
//! (`GPIB0::7::INSTR`) or aliases configured in the VISA library (the bench
//! uses the instrument model names as aliases).
//!
//! Feature-gated with `instrument_visa`.

use super::message_bus::BusSession;
use super::{InstrumentRole, WaitOutcome};
use crate::error::{AppResult, DaqError};
use std::ffi::CString;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use visa_rs::enums::gpib::RenMode;
use visa_rs::prelude::*;

/// Request-service bit of the IEEE 488.2 status byte.
const STB_RQS: u16 = 0x40;

/// Poll interval while waiting for a service request.
const SRQ_POLL: Duration = Duration::from_millis(5);

/// Open VISA session to one instrument.
pub struct VisaSession {
    role: InstrumentRole,
    // Declared before `_rm`: the session must close before its resource manager.
    instr: Instrument,
    _rm: DefaultRM,
}

impl VisaSession {
    /// Open `resource` through the default resource manager.
    pub fn open(role: InstrumentRole, resource: &str, timeout: Duration) -> AppResult<Self> {
        let open_err = |message: String| DaqError::InstrumentOpen {
            device: role.to_string(),
            message,
        };

        let rm = DefaultRM::new().map_err(|e| open_err(format!("VISA resource manager: {e}")))?;
        let name = CString::new(resource).map_err(|e| open_err(e.to_string()))?;
        let instr = rm
            .open(&name.into(), AccessMode::NO_LOCK, timeout)
            .map_err(|e| open_err(format!("{resource}: {e}")))?;

        Ok(Self {
            role,
            instr,
            _rm: rm,
        })
    }

    fn err(&self, e: impl std::fmt::Display) -> DaqError {
        DaqError::instrument(self.role.to_string(), e)
    }
}

impl BusSession for VisaSession {
    fn send(&mut self, message: &[u8]) -> AppResult<usize> {
        self.instr.write_all(message).map_err(|e| self.err(e))?;
        Ok(message.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> AppResult<usize> {
        self.instr.read(buf).map_err(|e| self.err(e))
    }

    fn device_clear(&mut self) -> AppResult<()> {
        self.instr.clear().map_err(|e| self.err(e))
    }

    fn go_to_local(&mut self) -> AppResult<()> {
        self.instr
            .gpib_control_ren(RenMode::DeassertGtl)
            .map_err(|e| self.err(e))
    }

    /// Serial-polls the status byte until RQS is set.
    fn wait_for_service_request(&mut self, timeout: Duration) -> AppResult<WaitOutcome> {
        let start = Instant::now();
        loop {
            let stb = self.instr.read_stb().map_err(|e| self.err(e))?;
            if stb & STB_RQS != 0 {
                return Ok(WaitOutcome::ServiceRequest);
            }
            if start.elapsed() >= timeout {
                return Ok(WaitOutcome::TimedOut);
            }
            std::thread::sleep(SRQ_POLL);
        }
    }
}

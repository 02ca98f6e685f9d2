//! Instrument transport adapters.
//!
//! Two bus families reach the bench instruments:
//! - **message bus** (GPIB through VISA): addressed request/response with
//!   device clear, service requests and local/remote control
//! - **byte stream** (a USBTMC device node): a raw readable/writable channel
//!
//! Both are unified behind [`Transport`]. Adapters report failures as
//! [`DaqError`] values and log context; whether a failure is fatal is decided
//! by the acquisition loop, never here.

use crate::config::{InstrumentDefinition, TransportKind};
use crate::error::{AppResult, DaqError};
use crate::hardware::mock::SimulatedLab;
use std::fmt;
use std::time::Duration;

pub mod byte_stream;
pub mod message_bus;
#[cfg(feature = "instrument_visa")]
pub mod visa_adapter;

pub use byte_stream::ByteStreamDevice;
pub use message_bus::{BusSession, MessageBusDevice};

/// Which bench instrument a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentRole {
    /// Two-channel power supply
    PowerSupply,
    /// Digital voltmeter
    Voltmeter,
    /// Oscilloscope DDS output
    WaveformSource,
}

impl InstrumentRole {
    /// All roles in acquisition order.
    pub const ALL: [InstrumentRole; 3] = [
        InstrumentRole::WaveformSource,
        InstrumentRole::PowerSupply,
        InstrumentRole::Voltmeter,
    ];
}

impl fmt::Display for InstrumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentRole::PowerSupply => write!(f, "power supply"),
            InstrumentRole::Voltmeter => write!(f, "voltmeter"),
            InstrumentRole::WaveformSource => write!(f, "waveform source"),
        }
    }
}

/// Result of waiting for the voltmeter's completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The device asserted a service request
    ServiceRequest,
    /// The wait bound elapsed first
    TimedOut,
}

/// Request/response contract shared by both bus families.
///
/// A handle is owned by exactly one task from open to [`Transport::close`];
/// `close` consumes it, so a closed handle cannot be used again.
pub trait Transport: Send {
    /// Instrument this handle talks to.
    fn role(&self) -> InstrumentRole;

    /// Send one command. Returns the number of bytes written.
    fn write(&mut self, command: &str) -> AppResult<usize>;

    /// Read at most `max_bytes`.
    ///
    /// Short reads are normal: the returned buffer is exactly as long as the
    /// data the device delivered, which may be less than requested. A response
    /// longer than `max_bytes` is truncated silently.
    fn read(&mut self, max_bytes: usize) -> AppResult<Vec<u8>>;

    /// Block until the device raises a service request or `timeout` elapses.
    fn wait_for_service_request(&mut self, _timeout: Duration) -> AppResult<WaitOutcome> {
        Err(DaqError::instrument(
            self.role().to_string(),
            "service requests are not available on this bus",
        ))
    }

    /// Release the handle, running the family-specific shutdown sequence.
    fn close(self: Box<Self>) -> AppResult<()>;
}

/// Write `command`, then read the reply as trimmed text.
pub fn query(transport: &mut dyn Transport, command: &str, max_bytes: usize) -> AppResult<String> {
    transport.write(command)?;
    let reply = transport.read(max_bytes)?;
    Ok(String::from_utf8_lossy(&reply)
        .trim_end_matches('\0')
        .trim()
        .to_string())
}

/// Opens transports for the roles of the bench.
pub trait InstrumentOpener {
    /// Open a session for `role` as described by `definition`.
    fn open(
        &self,
        role: InstrumentRole,
        definition: &InstrumentDefinition,
    ) -> AppResult<Box<dyn Transport>>;
}

/// Opener used by the binary: real hardware, or the simulated laboratory for
/// instruments configured as `simulated`.
#[derive(Clone, Default)]
pub struct DeviceOpener {
    lab: SimulatedLab,
}

impl DeviceOpener {
    /// Opener with a fresh simulated laboratory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The laboratory backing simulated instruments.
    pub fn lab(&self) -> &SimulatedLab {
        &self.lab
    }
}

impl InstrumentOpener for DeviceOpener {
    fn open(
        &self,
        role: InstrumentRole,
        definition: &InstrumentDefinition,
    ) -> AppResult<Box<dyn Transport>> {
        match definition.kind {
            TransportKind::Simulated => self.lab.open(role, definition),
            TransportKind::ByteStream => Ok(Box::new(ByteStreamDevice::open(
                role,
                &definition.resource,
            )?)),
            TransportKind::MessageBus => open_message_bus(role, definition),
        }
    }
}

#[cfg(feature = "instrument_visa")]
fn open_message_bus(
    role: InstrumentRole,
    definition: &InstrumentDefinition,
) -> AppResult<Box<dyn Transport>> {
    let session =
        visa_adapter::VisaSession::open(role, &definition.resource, definition.timeout())?;
    Ok(Box::new(MessageBusDevice::new(
        role,
        session,
        definition.reset_pause(),
    )))
}

#[cfg(not(feature = "instrument_visa"))]
fn open_message_bus(
    role: InstrumentRole,
    definition: &InstrumentDefinition,
) -> AppResult<Box<dyn Transport>> {
    tracing::error!(
        device = %role,
        resource = %definition.resource,
        "message-bus instruments need VISA support"
    );
    Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
}

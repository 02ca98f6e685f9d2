//! Two-channel programmable power supply (AKIP-1142/3G)
//!
//! Channel 1 biases the sample, channel 2 drives the laser diode.

use super::{send, STATUS_REPLY_BYTES};
use crate::adapters::{query, Transport};
use crate::config::{ChannelSetpoint, PowerSupplyConfig};
use std::time::Duration;
use tracing::warn;

/// Instantaneous output of both channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelReadings {
    /// Sample channel
    pub sample: f64,
    /// Laser channel
    pub laser: f64,
}

impl ChannelReadings {
    /// Parse a `"<sample>, <laser>"` reply.
    ///
    /// A field that does not parse reads as 0.0 and is reported with a warning.
    pub fn parse(reply: &str, quantity: &str) -> Self {
        let mut fields = reply.split(',').map(str::trim);
        let mut next = |channel: &str| {
            let field = fields.next().unwrap_or("");
            field.parse::<f64>().unwrap_or_else(|_| {
                warn!(
                    device = "power supply",
                    quantity,
                    channel,
                    reply,
                    "unparsed reading, using 0.0"
                );
                0.0
            })
        };
        let sample = next("sample");
        let laser = next("laser");
        Self { sample, laser }
    }
}

/// Command set of the power supply.
pub struct PowerSupply<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> PowerSupply<'a> {
    /// Wrap an open transport.
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }

    fn program_channel(&mut self, setpoint: &ChannelSetpoint) {
        send(
            self.transport,
            &format!("instrument:nselect {}", setpoint.channel),
        );
        send(
            self.transport,
            &format!("voltage:limit {}V", setpoint.voltage_limit),
        );
        // debug formatting keeps every digit and a trailing ".0" on whole volts
        send(self.transport, &format!("voltage {:?}", setpoint.voltage));
        send(self.transport, &format!("current {}", setpoint.current));
        send(self.transport, "channel:output 1");
    }

    /// Program both channels and enable their outputs.
    ///
    /// The master output stays off until the end of the sequence; the sample
    /// channel is left selected. Blocks for `settle` afterwards.
    pub fn configure(&mut self, config: &PowerSupplyConfig, settle: Duration) {
        send(self.transport, "output 0");
        self.program_channel(&config.sample);
        self.program_channel(&config.laser);
        send(
            self.transport,
            &format!("instrument:nselect {}", config.sample.channel),
        );
        std::thread::sleep(settle);
    }

    fn measure(&mut self, command: &str, quantity: &str) -> ChannelReadings {
        match query(self.transport, command, STATUS_REPLY_BYTES) {
            Ok(reply) => ChannelReadings::parse(&reply, quantity),
            Err(e) => {
                warn!(device = "power supply", quantity, error = %e, "measurement failed, using 0.0");
                ChannelReadings::default()
            }
        }
    }

    /// Output voltage of both channels.
    pub fn measure_voltages(&mut self) -> ChannelReadings {
        self.measure("measure:voltage:all?", "voltage")
    }

    /// Output current of both channels.
    pub fn measure_currents(&mut self) -> ChannelReadings {
        self.measure("measure:current:all?", "current")
    }

    /// Disable the output and zero the voltage.
    pub fn shut_off(&mut self) {
        send(self.transport, "output 0");
        send(self.transport, "voltage 0");
    }

    /// Audible end-of-run signal.
    pub fn beep(&mut self) {
        send(self.transport, "system:beeper");
    }
}

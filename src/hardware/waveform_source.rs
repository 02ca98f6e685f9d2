//! DDS output of the Hantek oscilloscope, used as a DC level generator.

use super::send;
use crate::adapters::Transport;

/// Command set of the waveform source.
pub struct WaveformSource<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> WaveformSource<'a> {
    /// Wrap an open transport.
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }

    /// Hide the scope channels and switch the generator to a DC level of 0 V.
    pub fn configure(&mut self) {
        for command in [
            "dds:switch 0",
            "channel1:display off",
            "channel2:display off",
            "channel3:display off",
            "channel4:display off",
            "dds:type dc",
            "dds:offset 0",
            "dds:wave:mode off",
            "dds:burst:switch off",
            "dds:switch 1",
        ] {
            send(self.transport, command);
        }
    }

    /// Step the output to `volts`.
    pub fn set_offset(&mut self, volts: f64) {
        send(self.transport, &format!("dds:offset {volts}"));
    }

    /// Return to 0 V and switch the generator off.
    pub fn shut_off(&mut self) {
        send(self.transport, "dds:offset 0");
        send(self.transport, "dds:switch 0");
    }
}

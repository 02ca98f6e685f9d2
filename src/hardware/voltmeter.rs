//! Digital voltmeter (AKIP-V7-78/1)
//!
//! Captures one decay curve per phase into its internal reading memory.
//! Two ways of knowing the curve is complete are supported, see [`SyncMode`].

use super::{log_error_status, send};
use crate::adapters::{Transport, WaitOutcome};
use crate::config::{SyncMode, VoltmeterConfig};
use std::time::Duration;
use tracing::{debug, warn};

/// Command set of the voltmeter.
pub struct Voltmeter<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> Voltmeter<'a> {
    /// Wrap an open transport.
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }

    /// DC voltage, fixed range, immediate trigger, `sample_count` readings
    /// per trigger. Blocks for `settle`, then logs the error status.
    pub fn configure(&mut self, config: &VoltmeterConfig, sample_count: usize, settle: Duration) {
        let commands = [
            "function \"voltage:dc\"".to_string(),
            "voltage:dc:range:auto off".to_string(),
            format!("voltage:dc:range {}", config.range_volts),
            format!("voltage:dc:resolution {:e}", config.resolution),
            format!("voltage:dc:nplcycles {}", config.nplc),
            "trigger:source immediate".to_string(),
            "trigger:delay:auto off".to_string(),
            "trigger:delay 0".to_string(),
            "trigger:count 1".to_string(),
            format!("sample:count {sample_count}"),
        ];
        for command in &commands {
            send(self.transport, command);
        }
        std::thread::sleep(settle);
        self.log_error_status();
    }

    /// Clear status and route operation-complete to the service request line.
    pub fn arm_service_request(&mut self) {
        send(self.transport, "*cls");
        send(self.transport, "*ese 1");
        send(self.transport, "*sre 32");
    }

    /// Start a capture.
    ///
    /// In fixed-delay mode this is the read request itself: the reply only
    /// arrives once the reading memory is full.
    pub fn begin_capture(&mut self, mode: SyncMode) {
        match mode {
            SyncMode::FixedDelay => {
                send(self.transport, "read?");
            }
            SyncMode::ServiceRequest => {
                send(self.transport, "init");
                send(self.transport, "*opc");
            }
        }
    }

    /// Wait for the completion signal. Returns whether it arrived in time.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        match self.transport.wait_for_service_request(timeout) {
            Ok(WaitOutcome::ServiceRequest) => {
                debug!(device = "voltmeter", "service request");
                true
            }
            Ok(WaitOutcome::TimedOut) => {
                warn!(
                    device = "voltmeter",
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out waiting for service request"
                );
                false
            }
            Err(e) => {
                warn!(device = "voltmeter", error = %e, "service request wait failed");
                false
            }
        }
    }

    /// Read the curve, at most `capacity` bytes.
    ///
    /// A failed read yields an empty buffer, which demultiplexes to no samples.
    pub fn fetch(&mut self, mode: SyncMode, capacity: usize) -> Vec<u8> {
        if mode == SyncMode::ServiceRequest {
            send(self.transport, "fetch?");
        }
        match self.transport.read(capacity) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(device = "voltmeter", error = %e, "curve read failed");
                Vec::new()
            }
        }
    }

    /// Query and log `system:error?`.
    pub fn log_error_status(&mut self) {
        log_error_status(self.transport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InstrumentOpener, InstrumentRole};
    use crate::config::LifetimeConfig;
    use crate::hardware::mock::SimulatedLab;

    fn open(lab: &SimulatedLab) -> Box<dyn Transport> {
        let config = LifetimeConfig::default().with_simulated_instruments();
        lab.open(InstrumentRole::Voltmeter, &config.instruments.voltmeter)
            .unwrap()
    }

    #[test]
    fn test_configure_commands() {
        let lab = SimulatedLab::new();
        let mut transport = open(&lab);
        Voltmeter::new(transport.as_mut()).configure(
            &VoltmeterConfig::default(),
            50_000,
            Duration::ZERO,
        );

        let commands = lab.commands_for(InstrumentRole::Voltmeter);
        assert_eq!(commands[0], "function \"voltage:dc\"");
        assert_eq!(commands[2], "voltage:dc:range 10");
        assert_eq!(commands[3], "voltage:dc:resolution 1e-5");
        assert_eq!(commands[4], "voltage:dc:nplcycles 0.02");
        assert_eq!(commands[9], "sample:count 50000");
        assert_eq!(commands.last().unwrap(), "system:error?");
    }

    #[test]
    fn test_fixed_delay_capture() {
        let lab = SimulatedLab::new();
        let mut transport = open(&lab);
        let mut vm = Voltmeter::new(transport.as_mut());
        vm.configure(&VoltmeterConfig::default(), 4, Duration::ZERO);

        vm.begin_capture(SyncMode::FixedDelay);
        let curve = vm.fetch(SyncMode::FixedDelay, 1024);

        assert!(!curve.is_empty());
        assert!(!lab
            .commands_for(InstrumentRole::Voltmeter)
            .contains(&"fetch?".to_string()));
    }

    #[test]
    fn test_service_request_capture() {
        let lab = SimulatedLab::new();
        let mut transport = open(&lab);
        let mut vm = Voltmeter::new(transport.as_mut());
        vm.configure(&VoltmeterConfig::default(), 4, Duration::ZERO);

        vm.arm_service_request();
        vm.begin_capture(SyncMode::ServiceRequest);
        assert!(vm.wait_for_completion(Duration::from_millis(10)));
        let curve = vm.fetch(SyncMode::ServiceRequest, 1024);
        assert_eq!(String::from_utf8_lossy(&curve).trim().split(',').count(), 4);

        let commands = lab.commands_for(InstrumentRole::Voltmeter);
        let tail: Vec<&str> = commands[commands.len() - 6..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tail, ["*cls", "*ese 1", "*sre 32", "init", "*opc", "fetch?"]);
    }

    #[test]
    fn test_timeout_is_reported_not_fatal() {
        let lab = SimulatedLab::new().without_service_requests();
        let mut transport = open(&lab);
        let mut vm = Voltmeter::new(transport.as_mut());
        vm.begin_capture(SyncMode::ServiceRequest);
        assert!(!vm.wait_for_completion(Duration::from_millis(1)));
    }
}

//! Mock Hardware Implementations
//!
//! A simulated lifetime bench for running the acquisition loop without
//! physical instruments. The three devices share one [`SimulatedLab`] so that
//! the voltmeter sees the offset the waveform source was last switched to.
//!
//! # Behaviour
//!
//! - Power supply: tracks per-channel voltage/current setpoints and output
//!   state, answers `measure:voltage:all?` / `measure:current:all?`
//! - Voltmeter: `sample:count N` sets the curve length; `read?` / `fetch?`
//!   queue an exponential relaxation from the previous offset to the current
//!   one, rendered as comma-separated readings
//! - Waveform source: `dds:offset X` moves the stimulus level
//!
//! Every command (and the close primitives `<clear>`, `<local>`, `<close>`) is
//! recorded in a journal for test verification. Failures can be injected.

use crate::adapters::{
    BusSession, ByteStreamDevice, InstrumentOpener, InstrumentRole, MessageBusDevice, Transport,
    WaitOutcome,
};
use crate::config::InstrumentDefinition;
use crate::error::{AppResult, DaqError};
use crate::run_state::RunState;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Curve length until the voltmeter receives `sample:count`.
const DEFAULT_SAMPLE_COUNT: usize = 50_000;

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Receiving instrument
    pub device: InstrumentRole,
    /// Command text, or a `<primitive>` marker
    pub command: String,
}

#[derive(Debug)]
struct LabState {
    journal: Vec<JournalEntry>,
    outputs: HashMap<InstrumentRole, VecDeque<u8>>,

    // power supply
    selected_channel: u8,
    voltages: HashMap<u8, f64>,
    currents: HashMap<u8, f64>,
    output_on: bool,

    // voltmeter
    sample_count: usize,
    measurement_started: bool,
    pending_curve: bool,
    fetches: usize,

    // waveform source
    offset: f64,
    previous_offset: f64,

    // failure injection
    refuse_open: Option<InstrumentRole>,
    fail_clear: Option<InstrumentRole>,
    truncate_after: Option<usize>,
    service_requests: bool,
    garbled_supply: bool,
    stop_on_fetch: Option<(usize, RunState)>,
}

impl Default for LabState {
    fn default() -> Self {
        Self {
            journal: Vec::new(),
            outputs: HashMap::new(),
            selected_channel: 1,
            voltages: HashMap::new(),
            currents: HashMap::new(),
            output_on: false,
            sample_count: DEFAULT_SAMPLE_COUNT,
            measurement_started: false,
            pending_curve: false,
            fetches: 0,
            offset: 0.0,
            previous_offset: 0.0,
            refuse_open: None,
            fail_clear: None,
            truncate_after: None,
            service_requests: true,
            garbled_supply: false,
            stop_on_fetch: None,
        }
    }
}

/// Shared simulated bench.
///
/// # Example
///
/// ```
/// use lifetime_daq::adapters::{InstrumentOpener, InstrumentRole};
/// use lifetime_daq::config::LifetimeConfig;
/// use lifetime_daq::hardware::mock::SimulatedLab;
///
/// let config = LifetimeConfig::default().with_simulated_instruments();
/// let lab = SimulatedLab::new();
/// let mut supply = lab
///     .open(InstrumentRole::PowerSupply, &config.instruments.power_supply)
///     .unwrap();
/// supply.write("output 0").unwrap();
/// assert_eq!(lab.commands_for(InstrumentRole::PowerSupply), vec!["output 0"]);
/// ```
#[derive(Clone, Default)]
pub struct SimulatedLab {
    state: Arc<Mutex<LabState>>,
}

impl SimulatedLab {
    /// Create a lab with all devices healthy.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LabState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse to open the given instrument.
    pub fn refuse_open(self, role: InstrumentRole) -> Self {
        self.lock().refuse_open = Some(role);
        self
    }

    /// Fail the device clear of the given message-bus instrument, so that
    /// its close reports an error.
    pub fn fail_clear(self, role: InstrumentRole) -> Self {
        self.lock().fail_clear = Some(role);
        self
    }

    /// Deliver only the first `readings` values of every curve.
    pub fn truncate_curves(self, readings: usize) -> Self {
        self.lock().truncate_after = Some(readings);
        self
    }

    /// Never raise a service request (waits time out).
    pub fn without_service_requests(self) -> Self {
        self.lock().service_requests = false;
        self
    }

    /// Answer power supply measurements with unparseable text.
    pub fn garble_supply_replies(self) -> Self {
        self.lock().garbled_supply = true;
        self
    }

    /// Stop `run_state` while serving the `nth` curve fetch (1-based),
    /// emulating an operator quitting mid-phase.
    pub fn stop_on_fetch(self, nth: usize, run_state: RunState) -> Self {
        self.lock().stop_on_fetch = Some((nth, run_state));
        self
    }

    /// Everything sent to any device so far.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    /// Commands received by one device, in order.
    pub fn commands_for(&self, role: InstrumentRole) -> Vec<String> {
        self.lock()
            .journal
            .iter()
            .filter(|entry| entry.device == role)
            .map(|entry| entry.command.clone())
            .collect()
    }

    /// Number of curves served by the voltmeter.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    fn record(&self, device: InstrumentRole, command: &str) {
        self.lock().journal.push(JournalEntry {
            device,
            command: command.to_string(),
        });
    }

    fn handle(&self, device: InstrumentRole, message: &[u8]) {
        let text = String::from_utf8_lossy(message).trim().to_string();
        self.record(device, &text);

        let command = text.to_lowercase();
        let mut state = self.lock();
        match device {
            InstrumentRole::PowerSupply => state.power_supply(&command),
            InstrumentRole::Voltmeter => state.voltmeter(&command),
            InstrumentRole::WaveformSource => state.waveform_source(&command),
        }
    }

    fn receive(&self, device: InstrumentRole, buf: &mut [u8]) -> usize {
        let mut state = self.lock();
        if device == InstrumentRole::Voltmeter && state.pending_curve {
            state.pending_curve = false;
            state.serve_curve();
        }
        let queue = state.outputs.entry(device).or_default();
        let n = queue.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

fn first_number(command: &str) -> Option<f64> {
    command
        .split_whitespace()
        .nth(1)
        .map(|arg| arg.trim_end_matches(|c: char| c.is_ascii_alphabetic()))
        .and_then(|arg| arg.parse().ok())
}

impl LabState {
    fn reply(&mut self, device: InstrumentRole, text: &str) {
        let queue = self.outputs.entry(device).or_default();
        queue.extend(text.as_bytes());
        queue.push_back(b'\n');
    }

    fn power_supply(&mut self, command: &str) {
        let device = InstrumentRole::PowerSupply;
        match command {
            "output 0" => self.output_on = false,
            "output 1" | "channel:output 1" => self.output_on = true,
            "measure:voltage:all?" | "measure:current:all?" => {
                if self.garbled_supply {
                    self.reply(device, "ERR");
                    return;
                }
                let table = if command.contains("voltage") {
                    &self.voltages
                } else {
                    &self.currents
                };
                let value = |ch: u8| {
                    if self.output_on {
                        table.get(&ch).copied().unwrap_or(0.0)
                    } else {
                        0.0
                    }
                };
                let text = format!("{:.4}, {:.4}", value(1), value(2));
                self.reply(device, &text);
            }
            "system:error?" => self.reply(device, "+0,\"No error\""),
            _ if command.starts_with("instrument:nselect") => {
                if let Some(ch) = first_number(command) {
                    self.selected_channel = ch as u8;
                }
            }
            _ if command.starts_with("voltage ") => {
                if let Some(v) = first_number(command) {
                    self.voltages.insert(self.selected_channel, v);
                }
            }
            _ if command.starts_with("current ") => {
                if let Some(i) = first_number(command) {
                    self.currents.insert(self.selected_channel, i);
                }
            }
            _ => {}
        }
    }

    fn voltmeter(&mut self, command: &str) {
        match command {
            "init" => self.measurement_started = true,
            "read?" | "fetch?" => self.pending_curve = true,
            "system:error?" => self.reply(InstrumentRole::Voltmeter, "+0,\"No error\""),
            "*cls" => self.measurement_started = false,
            _ if command.starts_with("sample:count") => {
                if let Some(n) = first_number(command) {
                    self.sample_count = n as usize;
                }
            }
            _ => {}
        }
    }

    fn waveform_source(&mut self, command: &str) {
        if command.starts_with("dds:offset") {
            if let Some(level) = first_number(command) {
                self.previous_offset = self.offset;
                self.offset = level;
            }
        }
    }

    fn serve_curve(&mut self) {
        self.fetches += 1;
        if let Some((nth, run_state)) = &self.stop_on_fetch {
            if *nth == self.fetches {
                run_state.stop();
            }
        }

        let count = self
            .truncate_after
            .map_or(self.sample_count, |k| k.min(self.sample_count));
        let tau = (self.sample_count as f64 / 5.0).max(1.0);
        let (start, target) = (self.previous_offset, self.offset);
        let readings: Vec<String> = (0..count)
            .map(|i| {
                let v = target + (start - target) * (-(i as f64) / tau).exp();
                format!("{v:+.6E}")
            })
            .collect();
        self.measurement_started = false;
        self.reply(InstrumentRole::Voltmeter, &readings.join(","));
    }
}

/// Bus session addressed to one simulated GPIB instrument.
pub struct SimulatedSession {
    lab: SimulatedLab,
    role: InstrumentRole,
}

impl BusSession for SimulatedSession {
    fn send(&mut self, message: &[u8]) -> AppResult<usize> {
        self.lab.handle(self.role, message);
        Ok(message.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> AppResult<usize> {
        Ok(self.lab.receive(self.role, buf))
    }

    fn device_clear(&mut self) -> AppResult<()> {
        self.lab.record(self.role, "<clear>");
        let mut state = self.lab.lock();
        if state.fail_clear == Some(self.role) {
            return Err(DaqError::instrument(self.role.to_string(), "device clear rejected"));
        }
        state.outputs.remove(&self.role);
        Ok(())
    }

    fn go_to_local(&mut self) -> AppResult<()> {
        self.lab.record(self.role, "<local>");
        Ok(())
    }

    fn wait_for_service_request(&mut self, _timeout: Duration) -> AppResult<WaitOutcome> {
        let state = self.lab.lock();
        if state.service_requests && state.measurement_started {
            Ok(WaitOutcome::ServiceRequest)
        } else {
            Ok(WaitOutcome::TimedOut)
        }
    }
}

/// Device node of the simulated oscilloscope.
pub struct SimulatedStream {
    lab: SimulatedLab,
    role: InstrumentRole,
}

impl Read for SimulatedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.lab.receive(self.role, buf))
    }
}

impl Write for SimulatedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.lab.handle(self.role, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        self.lab.record(self.role, "<close>");
    }
}

impl InstrumentOpener for SimulatedLab {
    fn open(
        &self,
        role: InstrumentRole,
        definition: &InstrumentDefinition,
    ) -> AppResult<Box<dyn Transport>> {
        if self.lock().refuse_open == Some(role) {
            return Err(DaqError::InstrumentOpen {
                device: role.to_string(),
                message: "simulated device is not responding".into(),
            });
        }

        let lab = self.clone();
        Ok(match role {
            InstrumentRole::WaveformSource => {
                Box::new(ByteStreamDevice::new(role, SimulatedStream { lab, role }))
            }
            _ => Box::new(MessageBusDevice::new(
                role,
                SimulatedSession { lab, role },
                definition.reset_pause(),
            )),
        })
    }
}

//! Configuration system using Figment
//!
//! Strongly-typed configuration for a lifetime measurement. Values are layered:
//! 1. Built-in defaults (the fixed-delay bench setup)
//! 2. A TOML file (`config/lifetime.toml` unless given on the command line)
//! 3. Environment variables prefixed with `LIFETIME_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use lifetime_daq::config::LifetimeConfig;
//!
//! let config = LifetimeConfig::load_from("config/lifetime_srq.toml")?;
//! println!("repetitions: {}", config.acquisition.repetitions);
//! # Ok::<(), lifetime_daq::error::DaqError>(())
//! ```
//!
//! Environment example: `LIFETIME_ACQUISITION__REPETITIONS=20`.

use crate::adapters::InstrumentRole;
use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/lifetime.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Repetition protocol and voltmeter synchronisation
    pub acquisition: AcquisitionConfig,
    /// Addressing of the three instruments
    pub instruments: InstrumentsConfig,
    /// Power supply setpoints
    pub power_supply: PowerSupplyConfig,
    /// Voltmeter measurement setup
    pub voltmeter: VoltmeterConfig,
    /// Output artifacts
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Name written into artifact headers
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "mipt_r125_lifetime_vm".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// How the loop learns that the voltmeter finished a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Request the reading right away and let the read block until the
    /// buffer is full.
    FixedDelay,
    /// Arm the service-request mask, start with `init`, wait for the
    /// service request (bounded) and then fetch.
    ServiceRequest,
}

/// What goes into the duration column of `lifetime.dat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryDuration {
    /// Column is reserved and always written as 0.0.
    Reserved,
    /// Sum of both phase durations of the repetition.
    PhaseTotal,
}

/// Time source for timestamps and phase durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Monotonic clock, immune to wall-clock steps.
    Monotonic,
    /// System wall clock.
    Wall,
}

/// Repetition protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Number of repetitions to run
    pub repetitions: u32,
    /// Readings per decay curve
    pub sample_count: usize,
    /// Capacity of the fetch response buffer in bytes
    pub read_capacity: usize,
    /// Voltmeter synchronisation strategy
    pub sync_mode: SyncMode,
    /// Delay between starting the voltmeter and switching the offset
    pub trigger_delay_us: u64,
    /// Upper bound for the service-request wait
    pub service_request_timeout_ms: u64,
    /// Waveform source offset for the rising phase
    pub rising_offset_volts: f64,
    /// Waveform source offset for the falling phase
    pub falling_offset_volts: f64,
    /// Duration column policy
    pub summary_duration: SummaryDuration,
    /// Clock behind the time column
    pub time_base: TimeBase,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            repetitions: 1,
            sample_count: 50_000,
            read_capacity: 20_000_000,
            sync_mode: SyncMode::FixedDelay,
            trigger_delay_us: 50_000,
            service_request_timeout_ms: 10_000,
            rising_offset_volts: 3.5,
            falling_offset_volts: 0.0,
            summary_duration: SummaryDuration::Reserved,
            time_base: TimeBase::Monotonic,
        }
    }
}

impl AcquisitionConfig {
    /// Delay between arming the voltmeter and the stimulus.
    pub fn trigger_delay(&self) -> Duration {
        Duration::from_micros(self.trigger_delay_us)
    }

    /// Bound for the service-request wait.
    pub fn service_request_timeout(&self) -> Duration {
        Duration::from_millis(self.service_request_timeout_ms)
    }
}

/// Bus family used to reach an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// GPIB (or any VISA message-based resource)
    MessageBus,
    /// Raw readable/writable device node such as `/dev/usbtmc0`
    ByteStream,
    /// In-process simulated laboratory
    Simulated,
}

/// Addressing and timing of one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Bus family
    pub kind: TransportKind,
    /// VISA resource name or device path
    #[serde(default)]
    pub resource: String,
    /// Pause after the configuration commands
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause after `*rst` while closing
    #[serde(default = "default_settle_ms")]
    pub reset_pause_ms: u64,
    /// I/O timeout handed to the bus driver
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl InstrumentDefinition {
    fn new(kind: TransportKind, resource: &str) -> Self {
        Self {
            kind,
            resource: resource.to_string(),
            settle_ms: default_settle_ms(),
            reset_pause_ms: default_settle_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Pause after configuration.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Pause after reset during close.
    pub fn reset_pause(&self) -> Duration {
        Duration::from_millis(self.reset_pause_ms)
    }

    /// Driver I/O timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The three instruments of the bench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentsConfig {
    /// Two-channel power supply (sample + laser)
    pub power_supply: InstrumentDefinition,
    /// Digital voltmeter capturing the decay
    pub voltmeter: InstrumentDefinition,
    /// Oscilloscope DDS output providing the stimulus
    pub waveform_source: InstrumentDefinition,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            power_supply: InstrumentDefinition::new(TransportKind::MessageBus, "AKIP-1142/3G"),
            voltmeter: InstrumentDefinition::new(TransportKind::MessageBus, "AKIP-V7-78/1"),
            waveform_source: InstrumentDefinition::new(TransportKind::ByteStream, "/dev/usbtmc0"),
        }
    }
}

impl InstrumentsConfig {
    /// Definition for one role.
    pub fn get(&self, role: InstrumentRole) -> &InstrumentDefinition {
        match role {
            InstrumentRole::PowerSupply => &self.power_supply,
            InstrumentRole::Voltmeter => &self.voltmeter,
            InstrumentRole::WaveformSource => &self.waveform_source,
        }
    }
}

/// Setpoints of one power supply channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetpoint {
    /// Channel number as selected with `instrument:nselect`
    pub channel: u8,
    /// Over-voltage limit, V
    pub voltage_limit: f64,
    /// Output voltage, V
    pub voltage: f64,
    /// Current limit, A
    pub current: f64,
}

/// Power supply setpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSupplyConfig {
    /// Sample bias channel
    pub sample: ChannelSetpoint,
    /// Laser channel
    pub laser: ChannelSetpoint,
}

impl Default for PowerSupplyConfig {
    fn default() -> Self {
        Self {
            sample: ChannelSetpoint {
                channel: 1,
                voltage_limit: 11.0,
                voltage: 10.0,
                current: 0.1,
            },
            laser: ChannelSetpoint {
                channel: 2,
                voltage_limit: 5.5,
                voltage: 5.0,
                current: 0.15,
            },
        }
    }
}

/// Voltmeter measurement setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltmeterConfig {
    /// Fixed DC range, V
    pub range_volts: f64,
    /// Resolution, V
    pub resolution: f64,
    /// Integration time in power line cycles
    pub nplc: f64,
}

impl Default for VoltmeterConfig {
    fn default() -> Self {
        Self {
            range_volts: 10.0,
            resolution: 1e-5,
            nplc: 0.02,
        }
    }
}

/// Output artifact settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which the experiment directory is created
    pub output_root: PathBuf,
    /// Start the live-plot process
    pub plot: bool,
    /// Plot program fed through its stdin
    pub plot_command: String,
    /// Send a plot command after every curve
    pub plot_curves: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            plot: true,
            plot_command: "gnuplot".to_string(),
            plot_curves: false,
        }
    }
}

impl LifetimeConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and the environment
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LIFETIME_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Route every instrument to the simulated laboratory.
    pub fn with_simulated_instruments(mut self) -> Self {
        for def in [
            &mut self.instruments.power_supply,
            &mut self.instruments.voltmeter,
            &mut self.instruments.waveform_source,
        ] {
            def.kind = TransportKind::Simulated;
        }
        self
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }
        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let acq = &self.acquisition;
        if acq.sample_count == 0 {
            return Err(DaqError::Configuration(
                "sample_count must be greater than 0".into(),
            ));
        }
        if acq.read_capacity < acq.sample_count {
            return Err(DaqError::Configuration(format!(
                "read_capacity {} cannot hold {} readings",
                acq.read_capacity, acq.sample_count
            )));
        }

        for role in InstrumentRole::ALL {
            let def = self.instruments.get(role);
            if def.kind != TransportKind::Simulated && def.resource.trim().is_empty() {
                return Err(DaqError::Configuration(format!(
                    "{role} needs a resource name"
                )));
            }
        }

        if acq.sync_mode == SyncMode::ServiceRequest
            && self.instruments.voltmeter.kind == TransportKind::ByteStream
        {
            return Err(DaqError::Configuration(
                "service_request sync needs a message-bus voltmeter".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_bench() {
        let config = LifetimeConfig::default();
        assert_eq!(config.acquisition.repetitions, 1);
        assert_eq!(config.acquisition.sample_count, 50_000);
        assert_eq!(config.acquisition.sync_mode, SyncMode::FixedDelay);
        assert_eq!(config.acquisition.trigger_delay(), Duration::from_millis(50));
        assert_eq!(config.instruments.waveform_source.kind, TransportKind::ByteStream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LifetimeConfig = toml::from_str(
            r#"
            [acquisition]
            repetitions = 5
            sync_mode = "service_request"

            [instruments.voltmeter]
            kind = "message_bus"
            resource = "GPIB0::7::INSTR"
            settle_ms = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.repetitions, 5);
        assert_eq!(config.acquisition.sync_mode, SyncMode::ServiceRequest);
        assert_eq!(config.acquisition.sample_count, 50_000);
        assert_eq!(config.instruments.voltmeter.resource, "GPIB0::7::INSTR");
        assert_eq!(config.instruments.voltmeter.reset_pause_ms, 1000);
        assert_eq!(config.power_supply.laser.channel, 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[acquisition]\nrepetitions = 3\nsummary_duration = \"phase_total\"\n\n[storage]\nplot = false"
        )
        .unwrap();

        let config = LifetimeConfig::load_from(file.path()).unwrap();
        assert_eq!(config.acquisition.repetitions, 3);
        assert_eq!(config.acquisition.summary_duration, SummaryDuration::PhaseTotal);
        assert!(!config.storage.plot);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LifetimeConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.acquisition, AcquisitionConfig::default());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LifetimeConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = LifetimeConfig::default();
        config.application.log_format = "xml".into();
        assert!(matches!(config.validate(), Err(DaqError::Configuration(_))));
        config.application.log_format = "JSON".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_must_hold_samples() {
        let mut config = LifetimeConfig::default();
        config.acquisition.read_capacity = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_service_request_needs_message_bus() {
        let mut config = LifetimeConfig::default();
        config.acquisition.sync_mode = SyncMode::ServiceRequest;
        config.instruments.voltmeter.kind = TransportKind::ByteStream;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_resource_rejected_unless_simulated() {
        let mut config = LifetimeConfig::default();
        config.instruments.power_supply.resource.clear();
        assert!(config.validate().is_err());

        let config = config.with_simulated_instruments();
        assert!(config.validate().is_ok());
    }
}

//! Acquisition engine for lifetime-decay runs.
//!
//! The engine owns every instrument handle and artifact of a run. It executes
//! the fixed protocol
//!
//! ```text
//! open + configure ─> { measure supply ─> rising capture ─> falling capture ─> record } x N
//!                  ─> drain ─> close (reverse order)
//! ```
//!
//! and reports back what was produced. The only state shared with the outside
//! is the [`RunState`] flag, sampled before each repetition and each phase.
//! Blocking waits (settle pauses, the trigger delay, the service-request wait
//! and the curve read) are never interrupted.
//!
//! # Failure handling
//!
//! | Failure                                   | Effect                                   |
//! |-------------------------------------------|------------------------------------------|
//! | instrument open                           | close what was opened, return error      |
//! | summary create / append, time read        | stop run, drain, close, return error     |
//! | curve file create / write                 | stop run, drain, close, return error     |
//! | command write, error-status query, close  | logged only                              |
//! | unparsed supply reading                   | logged, reads as 0.0                     |

use super::state::{AcquisitionState, Phase};
use crate::adapters::{InstrumentOpener, InstrumentRole};
use crate::clock::ExperimentClock;
use crate::config::{LifetimeConfig, SummaryDuration, SyncMode};
use crate::data::{CurveFile, ExperimentDir, PlotFeed, RepetitionRecord, SampleDemux, SummaryLog};
use crate::error::AppResult;
use crate::hardware::InstrumentRack;
use crate::run_state::RunState;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn};

/// What a finished run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Records appended to the summary, in order
    pub records: Vec<RepetitionRecord>,
    /// Curve files written, in order
    pub curves: Vec<PathBuf>,
    /// The run flag was stopped before the repetition count was exhausted
    pub stopped_early: bool,
    /// Number of instrument handles whose close sequence reported a failure
    pub close_failures: usize,
    /// Every state the engine passed through
    pub transitions: Vec<AcquisitionState>,
}

/// Drives one lifetime experiment from instrument open to teardown.
///
/// # Example
///
/// ```no_run
/// use lifetime_daq::adapters::DeviceOpener;
/// use lifetime_daq::config::LifetimeConfig;
/// use lifetime_daq::data::ExperimentDir;
/// use lifetime_daq::experiment::AcquisitionEngine;
/// use lifetime_daq::run_state::RunState;
///
/// let config = LifetimeConfig::load().unwrap();
/// let dir = ExperimentDir::create(&config.storage.output_root, "foo", &chrono::Local::now()).unwrap();
/// let mut engine = AcquisitionEngine::new(config, "foo", dir, RunState::new());
/// let report = engine.run(&DeviceOpener::new()).unwrap();
/// println!("{} repetitions", report.records.len());
/// ```
pub struct AcquisitionEngine {
    config: LifetimeConfig,
    experiment: String,
    dir: ExperimentDir,
    run_state: RunState,
    clock: ExperimentClock,
    state: AcquisitionState,
    report: RunReport,
}

impl AcquisitionEngine {
    /// Create an engine for `experiment`, writing into `dir`.
    pub fn new(
        config: LifetimeConfig,
        experiment: impl Into<String>,
        dir: ExperimentDir,
        run_state: RunState,
    ) -> Self {
        Self {
            clock: ExperimentClock::for_time_base(config.acquisition.time_base),
            config,
            experiment: experiment.into(),
            dir,
            run_state,
            state: AcquisitionState::Init,
            report: RunReport {
                transitions: vec![AcquisitionState::Init],
                ..Default::default()
            },
        }
    }

    /// Use a different time source for timestamps and phase durations.
    pub fn with_clock(mut self, clock: ExperimentClock) -> Self {
        self.clock = clock;
        self
    }

    /// Current state.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Execute the run.
    ///
    /// Instrument handles are always released before this returns, whatever
    /// the outcome. A fatal error also stops the shared run flag.
    pub fn run(&mut self, opener: &dyn InstrumentOpener) -> AppResult<RunReport> {
        let _span = info_span!("acquisition", experiment = %self.experiment).entered();
        let mut rack = InstrumentRack::new();

        let outcome = self.execute(opener, &mut rack);
        if let Err(e) = &outcome {
            error!(error = %e, "acquisition aborted");
            self.run_state.stop();
        }

        self.enter(AcquisitionState::Teardown);
        self.report.close_failures = rack.close_all().len();
        self.enter(AcquisitionState::Done);

        let report = std::mem::take(&mut self.report);
        info!(
            repetitions = report.records.len(),
            curves = report.curves.len(),
            stopped_early = report.stopped_early,
            "acquisition finished"
        );
        outcome.map(|()| report)
    }

    fn enter(&mut self, next: AcquisitionState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "unexpected state transition");
        }
        debug!(from = %self.state, to = %next, "state");
        self.state = next;
        self.report.transitions.push(next);
    }

    fn execute(
        &mut self,
        opener: &dyn InstrumentOpener,
        rack: &mut InstrumentRack,
    ) -> AppResult<()> {
        for role in InstrumentRole::ALL {
            let definition = self.config.instruments.get(role);
            if let Err(e) = rack.acquire(opener, role, definition) {
                error!(device = %role, error = %e, "unable to open instrument");
                return Err(e);
            }
        }
        self.configure(rack)?;

        let result = self.acquire(rack);
        self.drain(rack);
        result
    }

    fn configure(&mut self, rack: &mut InstrumentRack) -> AppResult<()> {
        let instruments = &self.config.instruments;

        rack.power_supply()?
            .configure(&self.config.power_supply, instruments.power_supply.settle());
        rack.voltmeter()?.configure(
            &self.config.voltmeter,
            self.config.acquisition.sample_count,
            instruments.voltmeter.settle(),
        );
        rack.waveform_source()?.configure();
        std::thread::sleep(instruments.waveform_source.settle());

        info!("instruments configured");
        Ok(())
    }

    fn acquire(&mut self, rack: &mut InstrumentRack) -> AppResult<()> {
        let mut summary = SummaryLog::create(
            &self.dir,
            &self.config.application.name,
            &self.experiment,
        )
        .map_err(|e| {
            error!(error = %e, "unable to create summary");
            e
        })?;
        let mut plot = self.start_plot();

        let result = self.repetitions(rack, &mut summary, plot.as_mut());

        if let Some(feed) = plot {
            if let Err(e) = feed.close() {
                warn!(error = %e, "plot feed did not close cleanly");
            }
        }
        result
    }

    fn start_plot(&self) -> Option<PlotFeed> {
        let storage = &self.config.storage;
        if !storage.plot {
            return None;
        }
        match PlotFeed::spawn(&storage.plot_command, &self.dir.plot_log_path()) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!(error = %e, "live plot unavailable");
                None
            }
        }
    }

    fn repetitions(
        &mut self,
        rack: &mut InstrumentRack,
        summary: &mut SummaryLog,
        mut plot: Option<&mut PlotFeed>,
    ) -> AppResult<()> {
        let count = self.config.acquisition.repetitions;
        for index in 0..count {
            if !self.run_state.is_running() {
                info!(next = index, "stop requested, no further repetitions");
                self.report.stopped_early = true;
                return Ok(());
            }

            self.enter(AcquisitionState::Armed);
            let _span = info_span!("repetition", index).entered();
            let Some(record) = self.repetition(index, rack, plot.as_deref_mut())? else {
                self.report.stopped_early = true;
                return Ok(());
            };

            self.enter(AcquisitionState::Recording);
            if let Err(e) = summary.append(&record) {
                error!(error = %e, "unable to write summary record");
                return Err(e);
            }
            self.report.records.push(record);
        }
        Ok(())
    }

    /// One measure-then-capture cycle. `None` when the run was stopped
    /// between the two phases.
    fn repetition(
        &mut self,
        index: u32,
        rack: &mut InstrumentRack,
        mut plot: Option<&mut PlotFeed>,
    ) -> AppResult<Option<RepetitionRecord>> {
        let timestamp = self.clock.elapsed_secs().map_err(|e| {
            error!(error = %e, "unable to get time");
            e
        })?;

        let (volts, amps) = {
            let mut supply = rack.power_supply()?;
            (supply.measure_voltages(), supply.measure_currents())
        };

        let mut capture_total = 0.0;
        for phase in Phase::ALL {
            if !self.run_state.is_running() {
                warn!(%phase, "stop requested between phases, repetition left incomplete");
                return Ok(None);
            }
            self.enter(AcquisitionState::Capturing(phase));
            capture_total += self.capture(index, phase, rack, plot.as_deref_mut())?;
        }

        let duration = match self.config.acquisition.summary_duration {
            SummaryDuration::Reserved => 0.0,
            SummaryDuration::PhaseTotal => capture_total,
        };
        Ok(Some(RepetitionRecord {
            index,
            timestamp,
            sample_voltage: volts.sample,
            sample_current: amps.sample,
            laser_voltage: volts.laser,
            laser_current: amps.laser,
            duration,
        }))
    }

    /// Capture one decay curve into its curve file. Returns the capture time.
    fn capture(
        &mut self,
        index: u32,
        phase: Phase,
        rack: &mut InstrumentRack,
        plot: Option<&mut PlotFeed>,
    ) -> AppResult<f64> {
        let acq = self.config.acquisition.clone();

        let mut curve = match CurveFile::create(
            &self.dir,
            index,
            phase,
            &self.config.application.name,
            &self.experiment,
        ) {
            Ok(curve) => curve,
            Err(e) => {
                error!(%phase, error = %e, "unable to create curve file");
                self.run_state.stop();
                return Err(e);
            }
        };

        if acq.sync_mode == SyncMode::ServiceRequest {
            rack.voltmeter()?.arm_service_request();
        }

        let started = self.clock.elapsed_secs()?;
        rack.voltmeter()?.begin_capture(acq.sync_mode);
        std::thread::sleep(acq.trigger_delay());
        let offset = match phase {
            Phase::Rising => acq.rising_offset_volts,
            Phase::Falling => acq.falling_offset_volts,
        };
        rack.waveform_source()?.set_offset(offset);

        if acq.sync_mode == SyncMode::ServiceRequest {
            rack.voltmeter()?
                .wait_for_completion(acq.service_request_timeout());
        }
        let block = rack.voltmeter()?.fetch(acq.sync_mode, acq.read_capacity);
        let duration = self.clock.elapsed_secs()? - started;

        let samples = curve.write_samples(SampleDemux::new(&block, acq.sample_count))?;
        curve.write_duration(duration)?;
        if samples < acq.sample_count {
            warn!(%phase, samples, expected = acq.sample_count, "short curve");
        }
        debug!(%phase, samples, duration, "curve captured");

        rack.voltmeter()?.log_error_status();

        let path = curve.path().to_path_buf();
        if let Err(e) = curve.close() {
            warn!(path = %path.display(), error = %e, "curve file did not close cleanly");
        }

        if let (true, Some(feed)) = (self.config.storage.plot_curves, plot) {
            let title = format!("i = {index}.{}", phase.index());
            if let Err(e) = feed.plot_curve(&title, &path) {
                warn!(error = %e, "unable to plot curve");
            }
        }

        self.report.curves.push(path);
        Ok(duration)
    }

    /// Put the bench in a safe state. Best-effort.
    fn drain(&mut self, rack: &mut InstrumentRack) {
        self.enter(AcquisitionState::Draining);
        if let Ok(mut supply) = rack.power_supply() {
            supply.shut_off();
        }
        if let Ok(mut source) = rack.waveform_source() {
            source.shut_off();
        }
        if let Ok(mut supply) = rack.power_supply() {
            supply.beep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimeSource;
    use crate::error::DaqError;
    use crate::hardware::mock::SimulatedLab;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn bench_config(repetitions: u32) -> LifetimeConfig {
        let mut config = LifetimeConfig::default().with_simulated_instruments();
        config.acquisition.repetitions = repetitions;
        config.acquisition.sample_count = 8;
        config.acquisition.read_capacity = 4096;
        config.acquisition.trigger_delay_us = 0;
        config.storage.plot = false;
        for role in InstrumentRole::ALL {
            let def = match role {
                InstrumentRole::PowerSupply => &mut config.instruments.power_supply,
                InstrumentRole::Voltmeter => &mut config.instruments.voltmeter,
                InstrumentRole::WaveformSource => &mut config.instruments.waveform_source,
            };
            def.settle_ms = 0;
            def.reset_pause_ms = 0;
        }
        config
    }

    /// Advances 250 ms per read.
    #[derive(Clone, Default)]
    struct SteppingTime(Arc<AtomicU64>);

    impl TimeSource for SteppingTime {
        fn now(&self) -> AppResult<Duration> {
            Ok(Duration::from_millis(self.0.fetch_add(250, Ordering::SeqCst)))
        }
    }

    struct BrokenTime;

    impl TimeSource for BrokenTime {
        fn now(&self) -> AppResult<Duration> {
            Err(DaqError::Clock("clock unavailable".into()))
        }
    }

    #[test]
    fn test_state_sequence_for_one_repetition() {
        let tmp = TempDir::new().unwrap();
        let mut engine = AcquisitionEngine::new(
            bench_config(1),
            "foo",
            ExperimentDir::open(tmp.path()),
            RunState::new(),
        );
        let report = engine.run(&SimulatedLab::new()).unwrap();

        use AcquisitionState::*;
        assert_eq!(
            report.transitions,
            vec![
                Init,
                Armed,
                Capturing(Phase::Rising),
                Capturing(Phase::Falling),
                Recording,
                Draining,
                Teardown,
                Done
            ]
        );
        assert!(engine.state().is_terminal());
        assert!(!report.stopped_early);
    }

    #[test]
    fn test_timestamps_and_phase_total() {
        let tmp = TempDir::new().unwrap();
        let mut config = bench_config(2);
        config.acquisition.summary_duration = SummaryDuration::PhaseTotal;
        let mut engine = AcquisitionEngine::new(
            config,
            "foo",
            ExperimentDir::open(tmp.path()),
            RunState::new(),
        )
        .with_clock(ExperimentClock::new(SteppingTime::default()));

        let report = engine.run(&SimulatedLab::new()).unwrap();
        // five reads per repetition: start + (begin, end) per phase
        assert_eq!(report.records[0].timestamp, 0.0);
        assert_eq!(report.records[1].timestamp, 1.25);
        assert_eq!(report.records[0].duration, 0.5);
    }

    #[test]
    fn test_reserved_duration_is_zero() {
        let tmp = TempDir::new().unwrap();
        let mut engine = AcquisitionEngine::new(
            bench_config(1),
            "foo",
            ExperimentDir::open(tmp.path()),
            RunState::new(),
        )
        .with_clock(ExperimentClock::new(SteppingTime::default()));
        let report = engine.run(&SimulatedLab::new()).unwrap();
        assert_eq!(report.records[0].duration, 0.0);
    }

    #[test]
    fn test_clock_failure_is_fatal_and_drains() {
        let tmp = TempDir::new().unwrap();
        let run_state = RunState::new();
        let lab = SimulatedLab::new();
        let mut engine = AcquisitionEngine::new(
            bench_config(3),
            "foo",
            ExperimentDir::open(tmp.path()),
            run_state.clone(),
        )
        .with_clock(ExperimentClock::new(BrokenTime));

        let result = engine.run(&lab);
        assert!(matches!(result, Err(DaqError::Clock(_))));
        assert!(!run_state.is_running());
        assert!(lab
            .commands_for(InstrumentRole::PowerSupply)
            .contains(&"system:beeper".to_string()));
        assert!(!tmp.path().join("curve_0.0.dat").exists());
    }

    #[test]
    fn test_stop_before_start_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let run_state = RunState::new();
        run_state.stop();
        let mut engine = AcquisitionEngine::new(
            bench_config(5),
            "foo",
            ExperimentDir::open(tmp.path()),
            run_state,
        );
        let report = engine.run(&SimulatedLab::new()).unwrap();
        assert!(report.records.is_empty());
        assert!(report.stopped_early);
        assert!(tmp.path().join("lifetime.dat").exists());
    }

    #[test]
    fn test_stop_between_phases_leaves_repetition_incomplete() {
        let tmp = TempDir::new().unwrap();
        let run_state = RunState::new();
        // first fetch is the rising curve of repetition 0
        let lab = SimulatedLab::new().stop_on_fetch(1, run_state.clone());
        let mut engine = AcquisitionEngine::new(
            bench_config(3),
            "foo",
            ExperimentDir::open(tmp.path()),
            run_state,
        );

        let report = engine.run(&lab).unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.curves.len(), 1);
        let text = std::fs::read_to_string(&report.curves[0]).unwrap();
        assert!(text.contains("# duration = "));
    }
}

//! Console and acquisition running concurrently, coupled only by the run flag.

use chrono::Local;
use lifetime_daq::commander::Commander;
use lifetime_daq::config::LifetimeConfig;
use lifetime_daq::data::ExperimentDir;
use lifetime_daq::experiment::AcquisitionEngine;
use lifetime_daq::hardware::mock::SimulatedLab;
use lifetime_daq::run_state::RunState;
use std::io::{self, BufReader, Read};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Console input that blocks until the test types a line.
struct TypedInput {
    lines: mpsc::Receiver<String>,
    pending: Vec<u8>,
}

impl Read for TypedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.lines.recv() {
                Ok(line) => self.pending = line.into_bytes(),
                // sender dropped: end of input
                Err(_) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

fn create_test_config() -> LifetimeConfig {
    toml::from_str(
        r#"
        [acquisition]
        repetitions = 1000
        sample_count = 16
        read_capacity = 4096
        trigger_delay_us = 2000

        [instruments.power_supply]
        kind = "simulated"
        settle_ms = 0
        reset_pause_ms = 0

        [instruments.voltmeter]
        kind = "simulated"
        settle_ms = 0
        reset_pause_ms = 0

        [instruments.waveform_source]
        kind = "simulated"
        settle_ms = 0

        [storage]
        plot = false
    "#,
    )
    .expect("Failed to parse test config")
}

#[tokio::test]
async fn test_quit_from_console_stops_between_repetitions() {
    let root = TempDir::new().unwrap();
    let dir = ExperimentDir::create(root.path(), "foo", &Local::now()).unwrap();
    let run_state = RunState::new();
    let lab = SimulatedLab::new();

    let (typed, lines) = mpsc::channel();
    let console_state = run_state.clone();
    let console = std::thread::spawn(move || {
        let input = BufReader::new(TypedInput {
            lines,
            pending: Vec::new(),
        });
        Commander::new(input, io::sink(), console_state).run()
    });

    let engine_lab = lab.clone();
    let engine_dir = dir.clone();
    let worker = tokio::task::spawn_blocking(move || {
        AcquisitionEngine::new(create_test_config(), "foo", engine_dir, run_state).run(&engine_lab)
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while lab.fetch_count() < 3 {
        assert!(Instant::now() < deadline, "acquisition made no progress");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    typed.send("h\n".into()).unwrap();
    typed.send("q\n".into()).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("acquisition did not stop")
        .unwrap()
        .unwrap();
    console.join().unwrap().unwrap();

    let completed = report.records.len();
    assert!(report.stopped_early);
    assert!(completed >= 1 && completed < 1000);
    // a repetition interrupted between its phases leaves one extra curve
    assert!(report.curves.len() == 2 * completed || report.curves.len() == 2 * completed + 1);
    for curve in &report.curves {
        let text = std::fs::read_to_string(curve).unwrap();
        assert!(text.trim_end().lines().last().unwrap().starts_with("# duration = "));
    }
    assert!(!dir.path().join(format!("curve_{}.0.dat", completed + 1)).exists());
}

#[tokio::test]
async fn test_end_of_console_input_stops_run() {
    let root = TempDir::new().unwrap();
    let dir = ExperimentDir::create(root.path(), "foo", &Local::now()).unwrap();
    let run_state = RunState::new();

    // closed console: the commander stops the run right away
    Commander::new(io::empty(), io::sink(), run_state.clone())
        .run()
        .unwrap();

    let report = tokio::task::spawn_blocking(move || {
        AcquisitionEngine::new(create_test_config(), "foo", dir, run_state)
            .run(&SimulatedLab::new())
    })
    .await
    .unwrap()
    .unwrap();

    assert!(report.records.is_empty());
    assert!(report.stopped_early);
}

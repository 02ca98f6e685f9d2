//! Exit status contract of the `lifetime` binary.
#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn lifetime(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lifetime"))
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run lifetime binary")
}

/// Exit status as the signed value passed to `exit`.
fn status(output: &Output) -> i32 {
    output.status.code().map(|c| c as u8 as i8 as i32).unwrap_or(i32::MIN)
}

fn write_config(dir: &Path, output_root: &str) -> String {
    let path = dir.join("bench.toml");
    std::fs::write(
        &path,
        format!(
            r#"
            [acquisition]
            repetitions = 2
            sample_count = 8
            read_capacity = 1024
            trigger_delay_us = 0

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
            output_root = "{output_root}"
            plot = false
            "#
        ),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_missing_experiment_name() {
    let cwd = TempDir::new().unwrap();
    let output = lifetime(cwd.path(), &[]);
    assert_eq!(status(&output), -1);
    assert_eq!(entries(cwd.path()), 0);
}

#[test]
fn test_directory_creation_failure() {
    let cwd = TempDir::new().unwrap();
    let config = write_config(cwd.path(), "does/not/exist");
    let output = lifetime(cwd.path(), &["foo", "--config", &config]);
    assert_eq!(status(&output), -2);
}

#[test]
fn test_invalid_configuration() {
    let cwd = TempDir::new().unwrap();
    let path = cwd.path().join("bad.toml");
    std::fs::write(&path, "[acquisition]\nsample_count = 0\n").unwrap();
    let output = lifetime(
        cwd.path(),
        &["foo", "--simulate", "--config", path.to_str().unwrap()],
    );
    assert_eq!(status(&output), -3);
    // only the config file, no experiment directory
    assert_eq!(entries(cwd.path()), 1);
}

#[test]
fn test_unknown_log_format_is_reported() {
    let cwd = TempDir::new().unwrap();
    let path = cwd.path().join("bad.toml");
    std::fs::write(&path, "[application]\nlog_format = \"xml\"\n").unwrap();
    let output = lifetime(
        cwd.path(),
        &["foo", "--simulate", "--config", path.to_str().unwrap()],
    );
    assert_eq!(status(&output), -3);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
    assert!(stderr.contains("log_format"), "stderr: {stderr}");
}

#[test]
fn test_simulated_run_succeeds() {
    let cwd = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let config = write_config(cwd.path(), &out.path().to_string_lossy());
    let output = lifetime(cwd.path(), &["foo", "--config", &config, "--repetitions", "1"]);

    assert_eq!(status(&output), 0, "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let dirs: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].to_string_lossy().ends_with("_foo"));
    assert!(dirs[0].join("lifetime.dat").exists());
}

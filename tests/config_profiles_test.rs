//! The shipped configuration profiles load and validate.

use lifetime_daq::config::{LifetimeConfig, SummaryDuration, SyncMode, TransportKind};
use std::path::PathBuf;

fn profile(name: &str) -> LifetimeConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(name);
    let config = LifetimeConfig::load_from(&path).expect("Failed to load profile");
    config.validate().expect("Profile must validate");
    config
}

#[test]
fn test_fixed_delay_profile() {
    let config = profile("lifetime.toml");
    assert_eq!(config.acquisition.sync_mode, SyncMode::FixedDelay);
    assert_eq!(config.acquisition.sample_count, 50_000);
    assert_eq!(config.acquisition.read_capacity, 20_000_000);
    assert_eq!(config.acquisition.summary_duration, SummaryDuration::Reserved);
    assert_eq!(config.instruments.waveform_source.kind, TransportKind::ByteStream);
    assert_eq!(config.instruments.waveform_source.resource, "/dev/usbtmc0");
    assert_eq!(config, LifetimeConfig::default());
}

#[test]
fn test_service_request_profile() {
    let config = profile("lifetime_srq.toml");
    assert_eq!(config.acquisition.sync_mode, SyncMode::ServiceRequest);
    assert_eq!(config.instruments.voltmeter.kind, TransportKind::MessageBus);
}

#[test]
fn test_simulated_override_keeps_protocol() {
    let config = profile("lifetime_srq.toml").with_simulated_instruments();
    assert!(config.validate().is_ok());
    assert_eq!(config.acquisition.sync_mode, SyncMode::ServiceRequest);
    assert_eq!(config.instruments.voltmeter.kind, TransportKind::Simulated);
}

//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! describe everything that can go wrong during a lifetime measurement, from
//! configuration problems to instrument and artifact failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading the TOML file or
//!   environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine
//!   (e.g. a read capacity smaller than the sample count).
//! - **`Io`**: Plain `std::io::Error` without further context.
//! - **`InstrumentOpen`** / **`Instrument`**: Failures opening or talking to one
//!   of the three instruments. The device role is carried so that diagnostics
//!   always name the failing device.
//! - **`Clock`**: The experiment time source could not be read.
//! - **`Artifact`**: An output file or pipe could not be created or written.
//! - **`Process`**: A helper program (the live plotter) could not be started.
//! - **`FeatureNotEnabled`**: Functionality compiled out via feature flags.
//! - **`ShutdownFailed`**: One or more best-effort teardown steps failed.
//!
//! The transport layer returns these errors; the acquisition loop decides which
//! of them are fatal to the run.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to open {device}: {message}")]
    InstrumentOpen { device: String, message: String },

    #[error("Instrument error ({device}): {message}")]
    Instrument { device: String, message: String },

    #[error("Unable to get time: {0}")]
    Clock(String),

    #[error("Artifact error ({}): {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to start '{program}': {source}")]
    Process {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Summary parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Shutdown failed with errors: {}", join_errors(.0))]
    ShutdownFailed(Vec<DaqError>),
}

impl DaqError {
    /// Instrument error helper that keeps call sites on one line.
    pub fn instrument(device: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DaqError::Instrument {
            device: device.into(),
            message: message.to_string(),
        }
    }

    /// Artifact error helper binding the failing path.
    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DaqError::Artifact {
            path: path.into(),
            source,
        }
    }
}

fn join_errors(errors: &[DaqError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

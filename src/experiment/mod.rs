//! Lifetime experiment execution.
//!
//! - [`state`]: acquisition lifecycle and capture phases
//! - [`run_engine`]: the acquisition loop itself

pub mod run_engine;
pub mod state;

pub use run_engine::{AcquisitionEngine, RunReport};
pub use state::{AcquisitionState, Phase};

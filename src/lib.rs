//! # Lifetime DAQ
//!
//! Sequencer for lifetime-decay measurements. A power supply biases the sample
//! and the laser, the DDS output of an oscilloscope steps the stimulus level,
//! and a digital voltmeter records the decay after every step.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: the [`adapters::Transport`] contract and its message-bus
//!   (GPIB/VISA) and byte-stream (USBTMC) implementations.
//! - **`hardware`**: command sets of the three instruments, the
//!   [`hardware::InstrumentRack`] that owns their handles, and a simulated bench.
//! - **`data`**: the curve demultiplexer, experiment artifacts and the live-plot feed.
//! - **`experiment`**: the acquisition state machine and engine.
//! - **`commander`**: the operator console.
//! - **`run_state`**: the stop flag shared by console and engine.
//! - **`clock`**: experiment-relative time.
//! - **`config`**, **`logging`**, **`error`**: ambient infrastructure.

pub mod adapters;
pub mod clock;
pub mod commander;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod run_state;

//! Acquisition state machine.
//!
//! Tracks where the acquisition loop is in its lifecycle. Transitions are
//! driven by the loop itself; the operator only influences them through the
//! shared run flag, which is sampled at repetition and phase boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stimulus direction of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waveform source steps to the rising offset
    Rising,
    /// Waveform source steps back to the falling offset
    Falling,
}

impl Phase {
    /// Both phases in capture order.
    pub const ALL: [Phase; 2] = [Phase::Rising, Phase::Falling];

    /// Phase number used in curve file names.
    pub fn index(self) -> u8 {
        match self {
            Phase::Rising => 0,
            Phase::Falling => 1,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Rising => write!(f, "rising"),
            Phase::Falling => write!(f, "falling"),
        }
    }
}

/// Acquisition lifecycle state.
///
/// # State Machine
///
/// ```text
/// Init ──> Armed ──> Capturing(Rising) ──> Capturing(Falling) ──> Recording
///  │         ▲                                                      │
///  │         └──────────────── next repetition ─────────────────────┘
///  │         │
///  │         └── count exhausted / stopped ──> Draining ──> Teardown ──> Done
///  │                                                           ▲
///  └────────────────── instrument open failed ─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    /// Opening and configuring instruments
    Init,
    /// Ready to start a repetition
    Armed,
    /// Capturing one decay curve
    Capturing(Phase),
    /// Appending the repetition record
    Recording,
    /// Issuing safety commands
    Draining,
    /// Closing instrument handles
    Teardown,
    /// Finished
    Done,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionState::Init => write!(f, "INIT"),
            AcquisitionState::Armed => write!(f, "ARMED"),
            AcquisitionState::Capturing(phase) => write!(f, "CAPTURING({phase})"),
            AcquisitionState::Recording => write!(f, "RECORDING"),
            AcquisitionState::Draining => write!(f, "DRAINING"),
            AcquisitionState::Teardown => write!(f, "TEARDOWN"),
            AcquisitionState::Done => write!(f, "DONE"),
        }
    }
}

impl AcquisitionState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;
        matches!(
            (*self, next),
            (Init, Armed)
                | (Init, Draining)
                | (Init, Teardown)
                | (Armed, Capturing(Phase::Rising))
                | (Armed, Draining)
                | (Capturing(Phase::Rising), Capturing(Phase::Falling))
                | (Capturing(_), Recording)
                | (Capturing(_), Draining)
                | (Recording, Armed)
                | (Recording, Draining)
                | (Draining, Teardown)
                | (Teardown, Done)
        )
    }

    /// Whether the loop has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcquisitionState::Done)
    }
}

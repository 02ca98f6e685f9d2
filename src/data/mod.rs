//! Curve demultiplexing and experiment artifacts.
pub mod demux;
pub mod plot;
pub mod storage;

pub use demux::{Sample, SampleDemux};
pub use plot::PlotFeed;
pub use storage::{CurveFile, ExperimentDir, RepetitionRecord, SummaryLog, SummaryReader};

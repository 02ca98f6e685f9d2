//! Flat-text artifacts of an experiment.
//!
//! Layout of one experiment directory:
//!
//! ```text
//! 2026-10-16_14-03-59_foo/
//! ├── lifetime.dat        summary, one line per completed repetition
//! ├── curve_0.0.dat       repetition 0, rising phase
//! ├── curve_0.1.dat       repetition 0, falling phase
//! └── gnuplot.log         output of the plot process
//! ```
//!
//! Every file starts with a `#` comment header. Numbers use C-style
//! exponent notation (`1.234560e-03`) so the files read the same in gnuplot,
//! spreadsheets and [`SummaryReader`].

use super::demux::SampleDemux;
use crate::error::{AppResult, DaqError};
use crate::experiment::state::Phase;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{DirBuilder, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the summary file inside the experiment directory.
pub const SUMMARY_FILE: &str = "lifetime.dat";

/// Name of the plot process log inside the experiment directory.
pub const PLOT_LOG_FILE: &str = "gnuplot.log";

/// `value` in C `%.<precision>e` notation: two-digit signed exponent.
pub fn format_exp(value: f64, precision: usize) -> String {
    let rust = format!("{value:.precision$e}");
    match rust.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            Err(_) => rust,
        },
        // inf / NaN
        None => rust,
    }
}

/// Output directory of one experiment.
#[derive(Debug, Clone)]
pub struct ExperimentDir {
    path: PathBuf,
}

impl ExperimentDir {
    /// `<YYYY>-<MM>-<DD>_<hh>-<mm>-<ss>_<name>`
    pub fn dir_name(experiment: &str, started: &DateTime<Local>) -> String {
        format!("{}_{experiment}", started.format("%Y-%m-%d_%H-%M-%S"))
    }

    /// Create the directory under `root` (mode 0775 on unix).
    ///
    /// Fails if the directory already exists.
    pub fn create(root: &Path, experiment: &str, started: &DateTime<Local>) -> AppResult<Self> {
        let path = root.join(Self::dir_name(experiment, started));
        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o775);
        }
        builder
            .create(&path)
            .map_err(|e| DaqError::artifact(&path, e))?;
        info!(path = %path.display(), "experiment directory created");
        Ok(Self { path })
    }

    /// Use an existing directory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the summary file.
    pub fn summary_path(&self) -> PathBuf {
        self.path.join(SUMMARY_FILE)
    }

    /// Path of the curve file for (repetition, phase).
    pub fn curve_path(&self, repetition: u32, phase: Phase) -> PathBuf {
        self.path
            .join(format!("curve_{repetition}.{}.dat", phase.index()))
    }

    /// Path of the plot process log.
    pub fn plot_log_path(&self) -> PathBuf {
        self.path.join(PLOT_LOG_FILE)
    }
}

/// One line of the summary file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionRecord {
    /// Repetition index, from 0
    pub index: u32,
    /// Seconds since acquisition start
    pub timestamp: f64,
    /// Sample channel voltage, V
    pub sample_voltage: f64,
    /// Sample channel current, A
    pub sample_current: f64,
    /// Laser channel voltage, V
    pub laser_voltage: f64,
    /// Laser channel current, A
    pub laser_current: f64,
    /// Measurement duration, s
    pub duration: f64,
}

impl RepetitionRecord {
    /// Tab-separated line without terminator.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.index,
            format_exp(self.timestamp, 6),
            format_exp(self.sample_voltage, 3),
            format_exp(self.sample_current, 3),
            format_exp(self.laser_voltage, 3),
            format_exp(self.laser_current, 3),
            format_exp(self.duration, 6),
        )
    }
}

/// Append-only summary file.
///
/// Each record is flushed as soon as it is written.
pub struct SummaryLog {
    path: PathBuf,
    file: File,
}

impl SummaryLog {
    /// Create `lifetime.dat` in `dir` and write the header.
    pub fn create(dir: &ExperimentDir, application: &str, experiment: &str) -> AppResult<Self> {
        let path = dir.summary_path();
        let mut file = File::create(&path).map_err(|e| DaqError::artifact(&path, e))?;
        write!(
            file,
            "# {application}\n\
             # Decay curves\n\
             # Experiment name \"{experiment}\"\n\
             #\n\
             # Columns:\n\
             # 1 - index\n\
             # 2 - time, s\n\
             # 3 - sample voltage, V\n\
             # 4 - sample current, A\n\
             # 5 - laser voltage, V\n\
             # 6 - laser current, A\n\
             # 7 - measurement duration, s\n"
        )
        .map_err(|e| DaqError::artifact(&path, e))?;
        Ok(Self { path, file })
    }

    /// Append one record.
    pub fn append(&mut self, record: &RepetitionRecord) -> AppResult<()> {
        writeln!(self.file, "{}", record.to_line())
            .and_then(|_| self.file.flush())
            .map_err(|e| DaqError::artifact(&self.path, e))?;
        debug!(index = record.index, "summary record written");
        Ok(())
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Curve file of one (repetition, phase) pair.
pub struct CurveFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CurveFile {
    /// Create the file and write its header.
    pub fn create(
        dir: &ExperimentDir,
        repetition: u32,
        phase: Phase,
        application: &str,
        experiment: &str,
    ) -> AppResult<Self> {
        let path = dir.curve_path(repetition, phase);
        let file = File::create(&path).map_err(|e| DaqError::artifact(&path, e))?;
        let mut curve = Self {
            path,
            writer: BufWriter::new(file),
        };
        let header = format!(
            "# {application}\n\
             # Decay curves\n\
             # Experiment name \"{experiment}\"\n\
             # Repetition {repetition}, {phase} phase\n\
             # Columns:\n\
             # 1 - index\n\
             # 2 - value, V\n"
        );
        curve.write_raw(&header)?;
        Ok(curve)
    }

    fn write_raw(&mut self, text: &str) -> AppResult<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|e| DaqError::artifact(&self.path, e))
    }

    /// Write every sample of `demux` as `index<TAB>value`. Returns the count.
    pub fn write_samples(&mut self, demux: SampleDemux<'_>) -> AppResult<usize> {
        let mut written = 0;
        for sample in demux {
            writeln!(self.writer, "{}\t{}", sample.index, sample.raw)
                .map_err(|e| DaqError::artifact(&self.path, e))?;
            written += 1;
        }
        Ok(written)
    }

    /// Write the duration trailer.
    pub fn write_duration(&mut self, seconds: f64) -> AppResult<()> {
        self.write_raw(&format!("# duration = {}\n", format_exp(seconds, 6)))
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close.
    pub fn close(self) -> AppResult<()> {
        let path = self.path;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| DaqError::artifact(&path, e.into_error()))?;
        file.sync_all().map_err(|e| DaqError::artifact(&path, e))
    }
}

/// Reads a summary file back into records.
pub struct SummaryReader;

impl SummaryReader {
    /// Parse every data line of `path`, skipping the comment header.
    pub fn read(path: &Path) -> AppResult<Vec<RepetitionRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }
}

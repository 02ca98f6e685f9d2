//! Live-plot feed
//!
//! Pipes gnuplot commands to an external plotting process. The process's
//! output goes to `gnuplot.log` in the experiment directory. The plot is a
//! convenience view, so callers treat every error here as a diagnostic.

use crate::error::{AppResult, DaqError};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, warn};

/// Running plot process with an open command pipe.
pub struct PlotFeed {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl PlotFeed {
    /// Start `program`, redirecting its output to `log_path`, and send the
    /// axis labels.
    pub fn spawn(program: &str, log_path: &Path) -> AppResult<Self> {
        let log = File::create(log_path).map_err(|e| DaqError::artifact(log_path, e))?;
        let log_err = log.try_clone().map_err(|e| DaqError::artifact(log_path, e))?;
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|source| DaqError::Process {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let mut feed = Self { child, stdin };
        feed.send("set xlabel \"Time, s\"")?;
        feed.send("set ylabel \"Voltage, V\"")?;
        debug!(program, "plot feed started");
        Ok(feed)
    }

    /// Send one command line.
    pub fn send(&mut self, line: &str) -> AppResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DaqError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()?;
        Ok(())
    }

    /// Plot one curve file.
    pub fn plot_curve(&mut self, title: &str, curve: &Path) -> AppResult<()> {
        self.send(&format!("set title \"{title}\""))?;
        self.send(&format!(
            "plot \"{}\" u 1:2 w l lw 1 notitle",
            curve.display()
        ))
    }

    /// Close the pipe and wait for the process to exit.
    pub fn close(mut self) -> AppResult<()> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            warn!(%status, "plot process exited with failure");
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_feed_writes_through_pipe() {
        // `cat` echoes the commands into the log
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gnuplot.log");
        let mut feed = PlotFeed::spawn("cat", &log).unwrap();
        feed.plot_curve("i = 0.0", Path::new("curve_0.0.dat")).unwrap();
        feed.close().unwrap();

        let text = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            text,
            "set xlabel \"Time, s\"\n\
             set ylabel \"Voltage, V\"\n\
             set title \"i = 0.0\"\n\
             plot \"curve_0.0.dat\" u 1:2 w l lw 1 notitle\n"
        );
    }

    #[test]
    fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let result = PlotFeed::spawn("/nonexistent/gnuplot", &dir.path().join("gnuplot.log"));
        match result {
            Err(DaqError::Process { program, source }) => {
                assert_eq!(program, "/nonexistent/gnuplot");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("spawn of a missing program succeeded"),
        }
    }
}

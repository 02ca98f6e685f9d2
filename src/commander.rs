//! Operator console.
//!
//! Reads single-letter commands while the acquisition runs:
//!
//! | Input | Effect                         |
//! |-------|--------------------------------|
//! | `h`   | print help                     |
//! | `q`   | stop the run                   |
//! | EOF   | stop the run                   |
//!
//! Only the first character of a line matters. The console's single effect on
//! the acquisition is stopping the shared [`RunState`].

use crate::run_state::RunState;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

const PROMPT: &str = "> ";

const HELP: &str = "Help:\n\th -- this help;\n\tq -- exit the program;\n";

/// Console command reader.
pub struct Commander<R, W> {
    input: R,
    output: W,
    run_state: RunState,
}

impl<R: BufRead, W: Write> Commander<R, W> {
    /// Read commands from `input`, prompting on `output`.
    pub fn new(input: R, output: W, run_state: RunState) -> Self {
        Self {
            input,
            output,
            run_state,
        }
    }

    /// Serve commands until the run stops, the operator quits, or input ends.
    pub fn run(mut self) -> io::Result<()> {
        while self.run_state.is_running() {
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output, "Exit")?;
                info!("console input closed, stopping run");
                self.run_state.stop();
                break;
            }

            let command = line.trim_end_matches(['\r', '\n']);
            match command.chars().next() {
                None => {}
                Some('h') => write!(self.output, "{HELP}")?,
                Some('q') => {
                    info!("stop requested from console");
                    self.run_state.stop();
                }
                Some(_) => warn!("Unknown command ({command})"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tracing_test::traced_test;

    fn console(script: &str) -> (RunState, String) {
        let run_state = RunState::new();
        let mut output = Vec::new();
        Commander::new(Cursor::new(script.as_bytes()), &mut output, run_state.clone())
            .run()
            .unwrap();
        (run_state, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_help_then_quit() {
        let (run_state, output) = console("h\nq\nh\n");
        assert!(!run_state.is_running());
        assert_eq!(output, format!("> {HELP}> "));
    }

    #[test]
    fn test_end_of_input_stops() {
        let (run_state, output) = console("");
        assert!(!run_state.is_running());
        assert_eq!(output, "> Exit\n");
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let (run_state, output) = console("\n\nq\n");
        assert!(!run_state.is_running());
        assert_eq!(output, "> > > ");
    }

    #[traced_test]
    #[test]
    fn test_unknown_command_is_reported() {
        let (run_state, _) = console("xyz\nquit\n");
        assert!(logs_contain("Unknown command (xyz)"));
        // only the first character counts
        assert!(!run_state.is_running());
    }

    #[test]
    fn test_already_stopped_reads_nothing() {
        let run_state = RunState::new();
        run_state.stop();
        let mut output = Vec::new();
        Commander::new(Cursor::new(b"h\n".as_slice()), &mut output, run_state)
            .run()
            .unwrap();
        assert!(output.is_empty());
    }
}

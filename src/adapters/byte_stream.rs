//! Byte-stream (USBTMC) instrument adapter
//!
//! The oscilloscope's DDS output is driven through a plain device node. There
//! is no addressing beyond the node itself: a write is one command, a read
//! returns whatever message the kernel driver has ready.

use super::message_bus::RESET_COMMAND;
use super::{InstrumentRole, Transport};
use crate::error::{AppResult, DaqError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Transport over any readable/writable byte channel.
pub struct ByteStreamDevice<S: Read + Write + Send> {
    role: InstrumentRole,
    stream: S,
}

impl ByteStreamDevice<File> {
    /// Open a device node read/write (e.g. `/dev/usbtmc0`).
    pub fn open(role: InstrumentRole, path: &str) -> AppResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DaqError::InstrumentOpen {
                device: role.to_string(),
                message: format!("{path}: {e}"),
            })?;
        Ok(Self::new(role, file))
    }
}

impl<S: Read + Write + Send> ByteStreamDevice<S> {
    /// Wrap an already open stream.
    pub fn new(role: InstrumentRole, stream: S) -> Self {
        Self { role, stream }
    }
}

impl<S: Read + Write + Send> Transport for ByteStreamDevice<S> {
    fn role(&self) -> InstrumentRole {
        self.role
    }

    fn write(&mut self, command: &str) -> AppResult<usize> {
        debug!(device = %self.role, command, "write");
        self.stream
            .write_all(command.as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|e| {
                warn!(device = %self.role, command, error = %e, "unable to write");
                DaqError::instrument(self.role.to_string(), e)
            })?;
        Ok(command.len())
    }

    fn read(&mut self, max_bytes: usize) -> AppResult<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        let count = self.stream.read(&mut buf).map_err(|e| {
            warn!(device = %self.role, error = %e, "unable to read");
            DaqError::instrument(self.role.to_string(), e)
        })?;
        buf.truncate(count);
        Ok(buf)
    }

    /// Sends `*rst`, then drops the stream (closing the descriptor).
    fn close(mut self: Box<Self>) -> AppResult<()> {
        let result = self.write(RESET_COMMAND).map(|_| ());
        if let Err(e) = &result {
            warn!(device = %self.role, error = %e, "unable to reset before close");
        }
        debug!(device = %self.role, "closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Read side is scripted, write side is captured.
    struct Loopback {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_then_short_read() {
        let mut dev = ByteStreamDevice::new(
            InstrumentRole::WaveformSource,
            Loopback {
                input: Cursor::new(b"DDS,ON".to_vec()),
                output: Vec::new(),
            },
        );

        assert_eq!(dev.write("dds:switch 1").unwrap(), 12);
        assert_eq!(dev.read(64).unwrap(), b"DDS,ON");
        assert_eq!(dev.stream.output, b"dds:switch 1");
    }

    #[test]
    fn test_open_failure_names_device() {
        let err = ByteStreamDevice::open(InstrumentRole::WaveformSource, "/nonexistent/usbtmc0")
            .err()
            .unwrap();
        assert!(matches!(err, DaqError::InstrumentOpen { ref device, .. } if device == "waveform source"));
    }
}

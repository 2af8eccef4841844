//! Destinations for serialized snapshots.

use crate::error::{DiscoveryError, Result};
use promsd_core::OutputConfig;
use std::io::Write;
use std::path::PathBuf;

/// Receives each changed snapshot as serialized JSON.
pub trait SnapshotSink {
    fn write(&mut self, payload: &[u8]) -> Result<()>;
}

/// Where target groups are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Standard output, one payload per emission followed by a newline
    Stdout,
    /// A file replaced in full on every emission
    File(PathBuf),
}

impl OutputSink {
    pub fn from_config(config: &OutputConfig) -> Self {
        match config.file() {
            Some(path) => OutputSink::File(path),
            None => OutputSink::Stdout,
        }
    }

    /// Human readable destination, used in logs and errors.
    pub fn destination(&self) -> String {
        match self {
            OutputSink::Stdout => "stdout".to_string(),
            OutputSink::File(path) => path.display().to_string(),
        }
    }

    fn output_error(&self, source: std::io::Error) -> DiscoveryError {
        DiscoveryError::Output {
            destination: self.destination(),
            source,
        }
    }
}

impl SnapshotSink for OutputSink {
    fn write(&mut self, payload: &[u8]) -> Result<()> {
        match &*self {
            OutputSink::Stdout => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                out.write_all(payload)
                    .and_then(|_| out.write_all(b"\n"))
                    .and_then(|_| out.flush())
                    .map_err(|e| self.output_error(e))
            }
            OutputSink::File(path) => {
                std::fs::write(path, payload).map_err(|e| self.output_error(e))
            }
        }
    }
}

use std::{io, path::PathBuf};

use log::{debug, error, info};

use crate::OverlayError;

use super::{Telemetry, TelemetryOutput};

/// A source of telemetry records feeding the stores.
///
/// # Lifecycle
///
/// 1. Call `start()` to open the underlying source
/// 2. Call `next_output()` repeatedly; `Ok(None)` means the source is exhausted
pub trait TelemetryProducer {
    /// Open the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened.
    fn start(&mut self) -> Result<(), OverlayError>;

    /// Next snapshot or session change, in time order.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is not started or a record cannot be decoded.
    fn next_output(&mut self) -> Result<Option<TelemetryOutput>, OverlayError>;
}

type OutputLines = Box<dyn Iterator<Item = io::Result<TelemetryOutput>> + Send>;

/// Replays a session recorded as JSON lines, one [`TelemetryOutput`] per line.
pub struct FileTelemetryProducer {
    path: PathBuf,
    lines: Option<OutputLines>,
    line_no: usize,
}

impl FileTelemetryProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
            line_no: 0,
        }
    }
}

impl TelemetryProducer for FileTelemetryProducer {
    fn start(&mut self) -> Result<(), OverlayError> {
        if !self.path.exists() {
            return Err(OverlayError::InvalidTelemetryFile {
                path: format!("{:?}", self.path),
            });
        }
        let lines = serde_jsonlines::json_lines::<TelemetryOutput, _>(&self.path)
            .map_err(|e| OverlayError::TelemetryFileError { source: e })?;
        info!("Replaying telemetry from {:?}", self.path);
        self.lines = Some(Box::new(lines));
        self.line_no = 0;
        Ok(())
    }

    fn next_output(&mut self) -> Result<Option<TelemetryOutput>, OverlayError> {
        let lines = self
            .lines
            .as_mut()
            .ok_or(OverlayError::TelemetryProducerError {
                description: "The telemetry file is not open, call start() first.".to_string(),
            })?;

        match lines.next() {
            None => {
                debug!("End of {:?} after {} records", self.path, self.line_no);
                Ok(None)
            }
            Some(Ok(output)) => {
                self.line_no += 1;
                Ok(Some(output))
            }
            Some(Err(e)) => {
                error!("Could not parse line {} of {:?}: {}", self.line_no + 1, self.path, e);
                Err(OverlayError::TelemetryProducerError {
                    description: format!("Could not parse line {}: {}", self.line_no + 1, e),
                })
            }
        }
    }
}

/// Replays an in-memory list of records, for tests and benchmarks.
#[derive(Default)]
pub struct MockTelemetryProducer {
    cur_tick: usize,
    outputs: Vec<TelemetryOutput>,
}

impl MockTelemetryProducer {
    pub fn from_outputs(outputs: Vec<TelemetryOutput>) -> Self {
        Self {
            cur_tick: 0,
            outputs,
        }
    }

    pub fn from_snapshots(snapshots: Vec<Telemetry>) -> Self {
        Self::from_outputs(
            snapshots
                .into_iter()
                .map(|t| TelemetryOutput::Snapshot(Box::new(t)))
                .collect(),
        )
    }
}

impl TelemetryProducer for MockTelemetryProducer {
    fn start(&mut self) -> Result<(), OverlayError> {
        // Mock producer doesn't need to open anything
        Ok(())
    }

    fn next_output(&mut self) -> Result<Option<TelemetryOutput>, OverlayError> {
        let output = self.outputs.get(self.cur_tick).cloned();
        if output.is_some() {
            self.cur_tick += 1;
        }
        Ok(output)
    }
}

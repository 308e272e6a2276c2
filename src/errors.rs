// Error types for overlay-telemetry

use crate::standings::SessionLapCount;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};
use tokio::runtime::TryCurrentError;

#[derive(Debug, Snafu)]
pub enum OverlayError {
    // Errors for the timer runtime
    #[snafu(display("No Tokio runtime available to schedule throttle timers"))]
    NoAsyncRuntime { source: TryCurrentError },
    #[snafu(display("Error building the Tokio runtime"))]
    RuntimeBuildError { source: io::Error },
    #[snafu(display("Telemetry collector task failed"))]
    CollectorTaskError { source: tokio::task::JoinError },

    // Errors while reading and replaying telemetry data
    #[snafu(display("Unable to open telemetry recording"))]
    TelemetryFileError { source: io::Error },
    #[snafu(display("Invalid telemetry file: {path}"))]
    InvalidTelemetryFile { path: String },
    #[snafu(display("Telemetry producer error: {description}"))]
    TelemetryProducerError { description: String },
    #[snafu(display("Telemetry store was dropped while a view was still subscribed"))]
    StoreClosed,

    // Errors for the lap count writer
    #[snafu(display("Error writing lap count file"))]
    WriterError { source: io::Error },
    #[snafu(display("Lap count writer thread panicked"))]
    WriterThreadPanicked,
    #[snafu(display("Error serializing lap count"))]
    WriterSerializeError { source: serde_json::Error },
    #[snafu(display("Error broadcasting lap count"))]
    LapCountBroadcastError {
        source: Box<SendError<SessionLapCount>>,
    },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<SendError<SessionLapCount>> for OverlayError {
    fn from(value: SendError<SessionLapCount>) -> Self {
        OverlayError::LapCountBroadcastError {
            source: Box::new(value),
        }
    }
}

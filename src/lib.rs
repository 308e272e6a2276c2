// Library interface for overlay-telemetry
// This allows integration tests and benches to access internal modules

pub mod config;
pub mod errors;
pub mod standings;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::OverlayError;
pub use standings::{PositionChange, SessionLapCount, SessionLapCountView};
pub use telemetry::{
    ManualScheduler, Scheduler, SessionInfo, Telemetry, TelemetryContext, TelemetryOutput,
    TelemetryVar, Throttled, TokioScheduler,
};

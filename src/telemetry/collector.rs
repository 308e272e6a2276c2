use std::{thread, time::Duration};

use log::info;

use crate::OverlayError;

use super::{TelemetryContext, TelemetryOutput, producer::TelemetryProducer};

/// Default pacing of replayed records, roughly the simulator's 60 Hz.
pub const REFRESH_RATE_MS: u64 = 16;

/// Pushes every record from `producer` into the matching store until it runs dry.
///
/// Blocks the calling thread, sleeping `refresh_rate` between records. Returns the
/// number of records published.
pub fn collect_telemetry(
    mut producer: impl TelemetryProducer,
    ctx: &TelemetryContext,
    refresh_rate: Duration,
) -> Result<usize, OverlayError> {
    producer.start()?;

    let mut published = 0;
    while let Some(output) = producer.next_output()? {
        match output {
            TelemetryOutput::Snapshot(telemetry) => {
                ctx.telemetry.set_telemetry(Some(*telemetry));
            }
            TelemetryOutput::SessionChange(session) => {
                info!("Session info changed, {} sessions", session.sessions.len());
                ctx.sessions.set_session(Some(*session));
            }
        }
        published += 1;

        if !refresh_rate.is_zero() {
            thread::sleep(refresh_rate);
        }
    }

    info!("Telemetry source exhausted after {} records", published);
    Ok(published)
}

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::mpsc::Receiver,
};

use log::error;

use crate::{OverlayError, standings::SessionLapCount};

/// Writes every received lap count as one JSON line until the sender hangs up.
pub fn write_lap_counts(
    file: &Path,
    lap_count_receiver: Receiver<SessionLapCount>,
) -> Result<usize, OverlayError> {
    let lap_count_file = File::create(file).map_err(|e| OverlayError::WriterError { source: e })?;
    let mut lap_count_writer = BufWriter::new(lap_count_file);
    let mut written = 0;
    for lap_count in &lap_count_receiver {
        let line = serde_json::to_string(&lap_count)
            .map_err(|e| OverlayError::WriterSerializeError { source: e })?;
        if let Err(e) = writeln!(lap_count_writer, "{}", line) {
            error!("Error while writing lap count to output file: {}", e);
            continue;
        }
        written += 1;
    }
    lap_count_writer
        .flush()
        .map_err(|e| OverlayError::WriterError { source: e })?;
    Ok(written)
}

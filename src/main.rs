use std::{
    path::PathBuf,
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand, arg};
use log::{info, warn};
use overlay_telemetry::{
    AppConfig, OverlayError, SessionLapCount, SessionLapCountView, TelemetryContext,
    telemetry::{collect_telemetry, producer::FileTelemetryProducer},
    writer,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replays a recorded session through the telemetry store
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        /// Delay between records, defaults to the configured replay rate
        #[arg(short, long)]
        rate_ms: Option<u64>,

        /// Throttle window of the lap count view
        #[arg(short, long)]
        session_throttle_ms: Option<u64>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Persist the effective settings to the config file
        #[arg(long, default_value_t = false)]
        save_config: bool,
    },
}

fn load_config() -> AppConfig {
    match AppConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            warn!("Could not load config file, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

fn publish(
    summary: SessionLapCount,
    lap_count_tx: Option<&Sender<SessionLapCount>>,
) -> Result<(), OverlayError> {
    info!(
        "state {} lap {}/{} time {:.1}/{:.1} remaining {:.1}",
        summary.state,
        summary.current_lap,
        summary.total_laps,
        summary.time,
        summary.time_total,
        summary.time_remaining
    );
    if let Some(tx) = lap_count_tx {
        tx.send(summary)?;
    }
    Ok(())
}

async fn replay_session(
    input: PathBuf,
    config: &AppConfig,
    lap_count_tx: Option<Sender<SessionLapCount>>,
) -> Result<(), OverlayError> {
    let ctx = TelemetryContext::with_tokio()?;
    let mut view = SessionLapCountView::with_throttle(&ctx, config.session_throttle());
    let mut last = view.current();
    publish(last, lap_count_tx.as_ref())?;

    let collector_ctx = ctx.clone();
    let rate = config.replay_rate();
    let mut collector = tokio::task::spawn_blocking(move || {
        collect_telemetry(FileTelemetryProducer::new(input), &collector_ctx, rate)
    });

    let published = loop {
        tokio::select! {
            changed = view.changed() => {
                changed?;
                let summary = view.current();
                if summary != last {
                    publish(summary, lap_count_tx.as_ref())?;
                    last = summary;
                }
            }
            result = &mut collector => {
                break result.map_err(|e| OverlayError::CollectorTaskError { source: e })??;
            }
        }
    };

    // trailing emissions of the last window
    tokio::time::sleep(config.session_throttle() + Duration::from_millis(1)).await;
    let summary = view.current();
    if summary != last {
        publish(summary, lap_count_tx.as_ref())?;
    }
    info!("Replay finished, {} records published", published);
    Ok(())
}

fn replay(
    input: PathBuf,
    config: AppConfig,
    output: Option<PathBuf>,
) -> Result<(), OverlayError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| OverlayError::RuntimeBuildError { source: e })?;

    let mut writer_thread = None;
    let lap_count_tx = output.map(|output_file| {
        let (lap_count_tx, lap_count_rx) = mpsc::channel::<SessionLapCount>();
        writer_thread = Some(thread::spawn(move || {
            writer::write_lap_counts(&output_file, lap_count_rx)
        }));
        lap_count_tx
    });

    let result = runtime.block_on(replay_session(input, &config, lap_count_tx));

    // the sender went out of scope with the session, so the writer drains and exits
    if let Some(handle) = writer_thread {
        let written = handle
            .join()
            .map_err(|_| OverlayError::WriterThreadPanicked)??;
        info!("Wrote {} lap counts", written);
    }
    result
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");
    match cli.command {
        Commands::Replay {
            input,
            rate_ms,
            session_throttle_ms,
            output,
            save_config,
        } => {
            let config = load_config().with_overrides(rate_ms, session_throttle_ms);
            if save_config {
                if let Err(e) = config.save() {
                    warn!("Could not save config file: {}", e);
                }
            }
            replay(input, config, output).expect("Error while replaying telemetry");
        }
    };
}

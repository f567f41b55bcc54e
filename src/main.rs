//! Negotiate and start a V4L2 capture stream.
//!
//! Exits 0 once the device is streaming into a mapped buffer, otherwise with
//! the exit code of the stage that failed (see [`Stage::exit_code`]).

use std::process::ExitCode;

use quickcap::capture::CaptureSession;
use quickcap::{utils, Config, Stage};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Initialize error handling and logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quickcap=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
    if let Err(report) = color_eyre::install() {
        warn!("Plain error reports: {}", report);
    }

    info!("quickcap launching...");

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            return exit(Stage::Configuration);
        }
    };

    // Auto-detect capture device if needed
    if config.capture.device.is_empty() {
        match utils::find_capture_device() {
            Ok(path) => config.capture.device = path,
            Err(report) => {
                error!("{:?}", report);
                return exit(Stage::Open);
            }
        }
    }

    match CaptureSession::start(&config.capture) {
        Ok(session) => {
            if let Some(format) = session.format() {
                info!("Streaming {}", format.spec);
            }
            for buffer in session.buffers() {
                info!("Buffer {} mapped, {} bytes", buffer.index(), buffer.len());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(stage = %err.stage(), "{}", err);
            exit(err.stage())
        }
    }
}

fn exit(stage: Stage) -> ExitCode {
    ExitCode::from(stage.exit_code())
}

//! camrelay entry point.
//!
//! Usage: `camrelay <DEVICE-UID>`
//!
//! First interrupt requests a graceful drain; a second interrupt while the
//! drain is pending terminates immediately with exit code 1. Setup and
//! argument errors exit with -1; a completed session exits with 0.

use std::process;
use std::sync::Arc;

use anyhow::Context;

use camrelay::config::RelayConfig;
use camrelay::consumer::FfmpegConsumer;
use camrelay::session::SessionManager;
use camrelay::shutdown::{InterruptAction, ShutdownController};
use camrelay::transport::sdk::SdkTransport;
use camrelay::transport::Transport;

fn main() {
    camrelay::init_logging();

    let device_id = match parse_device_id() {
        Some(id) => id,
        None => {
            eprintln!("usage: camrelay <DEVICE-UID>");
            process::exit(-1);
        }
    };

    match run(&device_id) {
        Ok(()) => {}
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("camrelay: {e:#}");
            process::exit(-1);
        }
    }
}

fn parse_device_id() -> Option<String> {
    let mut args = std::env::args().skip(1);
    let id = args.next()?;
    if id.is_empty() || args.next().is_some() {
        return None;
    }
    Some(id)
}

fn run(device_id: &str) -> anyhow::Result<()> {
    let config = RelayConfig::load_or_default(RelayConfig::default_path())
        .map_err(anyhow::Error::msg)
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let shutdown = ShutdownController::new();
    register_interrupt_handler(Arc::clone(&shutdown))?;

    let transport: Arc<dyn Transport> = Arc::new(
        SdkTransport::load(&config.transport.library_path, config.transport.max_streams)
            .context("failed to load the vendor transport library")?,
    );
    let mut consumer = FfmpegConsumer::new(&config.consumer, &config.sinks);
    let manager = SessionManager::new(transport, config);

    log::info!("relaying device {device_id}");
    if let Err(e) = manager.run(device_id, &mut consumer, &shutdown) {
        if let Some(desc) = e.describe() {
            log::error!("transport says: {desc}");
        }
        return Err(e.into());
    }
    Ok(())
}

fn register_interrupt_handler(shutdown: Arc<ShutdownController>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || match shutdown.request_interrupt() {
        InterruptAction::Graceful => {
            log::info!("interrupt received, draining; interrupt again to force exit");
        }
        InterruptAction::Force => {
            log::warn!("second interrupt, terminating immediately");
            process::exit(1);
        }
        InterruptAction::Ignored => {}
    })
    .context("failed to register the interrupt handler")
}

//! camrelay: relay live camera audio/video into named pipes for an external
//! RTSP transcoder.
//!
//! The camera is only reachable through a vendor session/transport SDK,
//! loaded at runtime. One session at a time: the session manager connects,
//! authenticates, starts the stream, issues the setup command sequence, then
//! runs one relay loop per media kind draining device buffers into two named
//! pipes. An ffmpeg child reads the pipes and publishes RTSP.
//!
//! ```no_run
//! use std::sync::Arc;
//! use camrelay::{
//!     config::RelayConfig, consumer::FfmpegConsumer, session::SessionManager,
//!     shutdown::ShutdownController, transport::sdk::SdkTransport,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::default();
//! let transport = Arc::new(SdkTransport::load(
//!     &config.transport.library_path,
//!     config.transport.max_streams,
//! )?);
//! let mut consumer = FfmpegConsumer::new(&config.consumer, &config.sinks);
//! let shutdown = ShutdownController::new();
//! let manager = SessionManager::new(transport, config);
//! manager.run("CAMERA-UID", &mut consumer, &shutdown)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod control;
pub mod errors;
pub mod maintenance;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod testing;
pub mod transport;

pub use config::RelayConfig;
pub use errors::RelayError;
pub use session::SessionManager;
pub use shutdown::{InterruptAction, ShutdownController, ShutdownState};
pub use transport::{CloseReason, FrameChunk, MediaKind, RecvResult, SessionId, StreamId, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize env_logger once, defaulting to info-level output for this
/// crate when `RUST_LOG` is unset. Safe to call more than once.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("camrelay=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

//! Session lifecycle orchestration.
//!
//! One [`SessionManager::run`] call owns the whole life of a camera session:
//! acquire and connect the transport session, start the authenticated stream,
//! issue the setup command sequence, wire up the sinks and the consumer,
//! run the relay loops to completion, then tear everything down.
//!
//! Teardown runs exactly once per call, on every path out of setup or
//! streaming, and releases only what was actually acquired, in reverse
//! order of acquisition. Setup failures are fail-fast; teardown steps are
//! best-effort and logged.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::consumer::Consumer;
use crate::control;
use crate::errors::RelayError;
use crate::maintenance;
use crate::relay::{self, LoopExit};
use crate::shutdown::ShutdownController;
use crate::sink::{ByteSink, FifoSink};
use crate::transport::{SessionId, StreamId, Transport};

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    config: RelayConfig,
}

/// Resources acquired so far, torn down in reverse order exactly once.
#[derive(Default)]
struct Teardown {
    session: Option<SessionId>,
    stream: Option<StreamId>,
    audio_sink: Option<FifoSink>,
    video_sink: Option<FifoSink>,
    consumer_started: bool,
}

impl Teardown {
    /// Release everything still held. Consuming `self` makes a second
    /// execution unrepresentable.
    fn execute(mut self, transport: &dyn Transport, consumer: &mut dyn Consumer) {
        if let Some(stream) = self.stream {
            let cmd = control::stop_command();
            if let Err(code) = transport.send_control(stream, cmd.opcode, &cmd.payload) {
                log::warn!("{} command failed: code {code}", cmd.label);
            }
        }
        if let Some(mut sink) = self.audio_sink.take() {
            sink.close();
        }
        if let Some(mut sink) = self.video_sink.take() {
            sink.close();
        }
        if self.consumer_started {
            consumer.terminate();
        }
        if let Some(stream) = self.stream.take() {
            transport.stop_stream(stream);
        }
        if let Some(session) = self.session.take() {
            transport.release_session(session);
        }
    }
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, config: RelayConfig) -> Self {
        Self { transport, config }
    }

    /// Run one full session against `device_id`. Returns once both relay
    /// loops have exited and teardown has completed.
    pub fn run(
        &self,
        device_id: &str,
        consumer: &mut dyn Consumer,
        shutdown: &Arc<ShutdownController>,
    ) -> Result<(), RelayError> {
        let mut teardown = Teardown::default();
        let result = self.run_inner(device_id, consumer, shutdown, &mut teardown);
        if let Err(e) = &result {
            log::error!("session against {device_id} failed: {e}");
        }
        teardown.execute(self.transport.as_ref(), consumer);
        shutdown.mark_terminated();
        log::info!("session against {device_id} finished");
        result
    }

    fn run_inner(
        &self,
        device_id: &str,
        consumer: &mut dyn Consumer,
        shutdown: &Arc<ShutdownController>,
        teardown: &mut Teardown,
    ) -> Result<(), RelayError> {
        let transport = self.transport.as_ref();

        let slot = transport
            .acquire_session()
            .map_err(RelayError::SessionAcquisition)?;
        teardown.session = Some(slot);
        log::debug!("acquired session slot {}", slot.0);

        let session = transport.connect(slot, device_id).map_err(|code| {
            RelayError::Connect {
                device: device_id.to_string(),
                code,
            }
        })?;
        teardown.session = Some(session);
        log::info!("connected to {device_id}, session {}", session.0);

        let info = transport
            .start_stream(
                session,
                &self.config.credentials(),
                self.config.transport.start_timeout_secs,
            )
            .map_err(|code| RelayError::StreamStart { code })?;
        teardown.stream = Some(info.stream);
        log::info!(
            "stream {} started, resend {}, server type {}",
            info.stream.0,
            info.resend_count,
            info.server_type
        );

        for cmd in control::setup_sequence() {
            transport
                .send_control(info.stream, cmd.opcode, &cmd.payload)
                .map_err(|code| RelayError::ControlCommand {
                    opcode: cmd.opcode,
                    label: cmd.label,
                    code,
                })?;
            log::debug!("{} acknowledged", cmd.label);
        }

        let mut audio_sink = FifoSink::create(&self.config.sinks.audio_fifo)?;
        audio_sink.open()?;
        teardown.audio_sink = Some(audio_sink);
        let mut video_sink = FifoSink::create(&self.config.sinks.video_fifo)?;
        video_sink.open()?;
        teardown.video_sink = Some(video_sink);

        consumer.start()?;
        teardown.consumer_started = true;

        self.stream_until_done(info.stream, teardown, shutdown)
    }

    /// Spawn the relay and maintenance threads, then block until both relay
    /// loops are done. The loops own their sinks from here on.
    fn stream_until_done(
        &self,
        stream: StreamId,
        teardown: &mut Teardown,
        shutdown: &Arc<ShutdownController>,
    ) -> Result<(), RelayError> {
        let tuning = self.config.tuning();
        let cadence = Duration::from_secs(self.config.relay.maintenance_interval_secs);
        maintenance::spawn(
            Arc::clone(&self.transport),
            stream,
            cadence,
            Arc::clone(shutdown),
        );

        // Sinks move out of the teardown set: each loop closes its own.
        let mut audio_sink = match teardown.audio_sink.take() {
            Some(sink) => sink,
            None => return Err(RelayError::Config("audio sink missing".into())),
        };
        let mut video_sink = match teardown.video_sink.take() {
            Some(sink) => sink,
            None => return Err(RelayError::Config("video sink missing".into())),
        };

        let audio_handle = {
            let transport = Arc::clone(&self.transport);
            let shutdown = Arc::clone(shutdown);
            thread::Builder::new()
                .name("camrelay-audio".into())
                .spawn(move || {
                    relay::run_audio_relay(
                        transport.as_ref(),
                        stream,
                        &mut audio_sink,
                        &shutdown,
                        &tuning,
                    )
                })?
        };
        let video_handle = {
            let transport = Arc::clone(&self.transport);
            let shutdown = Arc::clone(shutdown);
            thread::Builder::new()
                .name("camrelay-video".into())
                .spawn(move || {
                    relay::run_video_relay(
                        transport.as_ref(),
                        stream,
                        &mut video_sink,
                        &shutdown,
                        &tuning,
                    )
                })?
        };

        join_relay("audio", audio_handle);
        join_relay("video", video_handle);
        Ok(())
    }
}

fn join_relay(label: &str, handle: thread::JoinHandle<LoopExit>) {
    match handle.join() {
        Ok(exit) => log::debug!("{label} relay joined: {exit:?}"),
        Err(_) => log::error!("{label} relay thread panicked"),
    }
}

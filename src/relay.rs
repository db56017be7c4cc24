//! Media relay loops.
//!
//! One loop per media kind, each pulling buffered frames out of the
//! transport and writing them verbatim to its sink. The loops share nothing
//! but the read-only cancellation flag, so audio and video can fail or drain
//! at different rates without coordination; one loop's terminal exit never
//! stops its sibling.
//!
//! The transport is non-blocking by contract, so "no data" drives an
//! explicit fixed-interval poll-sleep rather than a blocking wait.

use std::thread;
use std::time::Duration;

use crate::shutdown::ShutdownController;
use crate::sink::ByteSink;
use crate::transport::{CloseReason, MediaKind, RecvResult, StreamId, Transport};

/// Tuning knobs shared by both loops. Values come from
/// [`crate::config::RelayConfig`]; defaults mirror the camera client this
/// relay replaces.
#[derive(Debug, Clone, Copy)]
pub struct RelayTuning {
    /// Sleep between polls when the transport reports no data ready.
    pub poll_interval: Duration,
    /// Minimum buffered audio frames before draining, to avoid starving the
    /// pipeline with tiny reads.
    pub audio_ready_threshold: usize,
    /// Per-receive payload ceiling for audio frames.
    pub audio_max_frame: usize,
    /// Per-receive payload ceiling for video frames.
    pub video_max_frame: usize,
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            audio_ready_threshold: 25,
            audio_max_frame: 1024,
            video_max_frame: 128_000,
        }
    }
}

/// Why a relay loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Cooperative cancellation via the shutdown controller.
    Cancelled,
    /// The transport reported a loop-terminal condition.
    Closed(CloseReason),
}

/// Drain buffered audio frames into the sink until a terminal transport
/// condition or cancellation.
///
/// Receives are gated on a minimum buffered-frame count; a negative check
/// result is terminal, matching the transport's contract. `LostFrame`
/// results are skipped without writing and without ending the loop.
pub fn run_audio_relay(
    transport: &dyn Transport,
    stream: StreamId,
    sink: &mut dyn ByteSink,
    shutdown: &ShutdownController,
    tuning: &RelayTuning,
) -> LoopExit {
    log::info!("audio relay started");
    let exit = loop {
        match transport.audio_ready(stream) {
            Err(reason) => break LoopExit::Closed(reason),
            Ok(buffered) if buffered < tuning.audio_ready_threshold => {
                if shutdown.cancel_requested() {
                    break LoopExit::Cancelled;
                }
                thread::sleep(tuning.poll_interval);
                continue;
            }
            Ok(_) => {}
        }

        match transport.recv_audio(stream, tuning.audio_max_frame) {
            RecvResult::Frame(chunk) => {
                if let Some(exit) = relay_chunk(MediaKind::Audio, &chunk.payload, sink, shutdown) {
                    break exit;
                }
            }
            RecvResult::LostFrame => continue,
            RecvResult::NotReady => {
                if shutdown.cancel_requested() {
                    break LoopExit::Cancelled;
                }
                thread::sleep(tuning.poll_interval);
            }
            RecvResult::Closed(reason) => break LoopExit::Closed(reason),
        }
    };
    sink.close();
    log::info!("audio relay exit: {}", describe_exit(&exit));
    exit
}

/// Drain video frames into the sink until a terminal transport condition or
/// cancellation. Unlike audio there is no buffered-count gate: the receive
/// is always attempted and `NotReady` drives the poll-sleep.
pub fn run_video_relay(
    transport: &dyn Transport,
    stream: StreamId,
    sink: &mut dyn ByteSink,
    shutdown: &ShutdownController,
    tuning: &RelayTuning,
) -> LoopExit {
    log::info!("video relay started");
    let exit = loop {
        match transport.recv_video(stream, tuning.video_max_frame) {
            RecvResult::Frame(chunk) => {
                if let Some(exit) = relay_chunk(MediaKind::Video, &chunk.payload, sink, shutdown) {
                    break exit;
                }
            }
            RecvResult::NotReady => {
                if shutdown.cancel_requested() {
                    break LoopExit::Cancelled;
                }
                thread::sleep(tuning.poll_interval);
            }
            RecvResult::LostFrame => {
                // Not part of the video receive contract; skip defensively.
                log::debug!("video receive reported a lost frame");
                continue;
            }
            RecvResult::Closed(reason) => break LoopExit::Closed(reason),
        }
    };
    sink.close();
    log::info!("video relay exit: {}", describe_exit(&exit));
    exit
}

/// Write one received payload to the sink, honoring the cancellation
/// protocol: exit before writing if teardown already began, and re-check
/// right after the write so at most one chunk goes out after a shutdown
/// request. Write failures are logged, never loop-terminal.
fn relay_chunk(
    kind: MediaKind,
    payload: &[u8],
    sink: &mut dyn ByteSink,
    shutdown: &ShutdownController,
) -> Option<LoopExit> {
    if shutdown.cancel_requested() {
        return Some(LoopExit::Cancelled);
    }
    if let Err(e) = sink.write_chunk(payload) {
        log::warn!("{} sink write failed: {e}", kind.as_str());
    }
    if shutdown.cancel_requested() {
        return Some(LoopExit::Cancelled);
    }
    None
}

fn describe_exit(exit: &LoopExit) -> &'static str {
    match exit {
        LoopExit::Cancelled => "cancelled",
        LoopExit::Closed(reason) => reason.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRecv, ScriptedTransport, VecSink};

    fn fast_tuning() -> RelayTuning {
        RelayTuning {
            poll_interval: Duration::from_millis(1),
            ..RelayTuning::default()
        }
    }

    #[test]
    fn audio_lost_frame_is_skipped_without_writing() {
        let transport = ScriptedTransport::new();
        transport.push_audio(ScriptedRecv::Frame(b"one".to_vec()));
        transport.push_audio(ScriptedRecv::LostFrame);
        transport.push_audio(ScriptedRecv::Frame(b"two".to_vec()));
        transport.push_audio(ScriptedRecv::Closed(CloseReason::ClosedByRemote));

        let shutdown = ShutdownController::new();
        let mut sink = VecSink::default();
        let exit = run_audio_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Closed(CloseReason::ClosedByRemote));
        assert_eq!(sink.chunks, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(sink.closed);
    }

    #[test]
    fn audio_gate_sleeps_below_threshold_then_drains() {
        let transport = ScriptedTransport::new();
        transport.push_audio_ready(Ok(0));
        transport.push_audio_ready(Ok(3));
        transport.push_audio_ready(Ok(40));
        transport.push_audio(ScriptedRecv::Frame(b"pcm".to_vec()));
        transport.push_audio(ScriptedRecv::Closed(CloseReason::RemoteTimeout));

        let shutdown = ShutdownController::new();
        let mut sink = VecSink::default();
        let exit = run_audio_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Closed(CloseReason::RemoteTimeout));
        assert_eq!(sink.chunks, vec![b"pcm".to_vec()]);
    }

    #[test]
    fn negative_audio_buffer_check_is_terminal() {
        let transport = ScriptedTransport::new();
        transport.push_audio_ready(Err(CloseReason::InvalidSession));

        let shutdown = ShutdownController::new();
        let mut sink = VecSink::default();
        let exit = run_audio_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Closed(CloseReason::InvalidSession));
        assert!(sink.chunks.is_empty());
    }

    #[test]
    fn video_not_ready_polls_until_a_frame_arrives() {
        let transport = ScriptedTransport::new();
        transport.push_video(ScriptedRecv::NotReady);
        transport.push_video(ScriptedRecv::NotReady);
        transport.push_video(ScriptedRecv::Frame(b"nal".to_vec()));
        transport.push_video(ScriptedRecv::Closed(CloseReason::ClosedByRemote));

        let shutdown = ShutdownController::new();
        let mut sink = VecSink::default();
        let exit = run_video_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Closed(CloseReason::ClosedByRemote));
        assert_eq!(sink.chunks, vec![b"nal".to_vec()]);
    }

    #[test]
    fn cancellation_before_a_received_frame_skips_the_write() {
        let transport = ScriptedTransport::new();
        transport.push_video(ScriptedRecv::Frame(b"dropped".to_vec()));

        let shutdown = ShutdownController::new();
        shutdown.request_interrupt();
        let mut sink = VecSink::default();
        let exit = run_video_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Cancelled);
        assert!(sink.chunks.is_empty());
    }

    #[test]
    fn at_most_one_write_after_cancellation_lands_mid_write() {
        // A sink that requests shutdown while the write is in flight: the
        // post-write check must stop the loop after that single chunk.
        struct CancellingSink {
            inner: VecSink,
            shutdown: std::sync::Arc<ShutdownController>,
        }
        impl ByteSink for CancellingSink {
            fn write_chunk(&mut self, payload: &[u8]) -> std::io::Result<()> {
                self.shutdown.request_interrupt();
                self.inner.write_chunk(payload)
            }
            fn close(&mut self) {
                self.inner.close();
            }
        }

        let transport = ScriptedTransport::new();
        transport.push_video(ScriptedRecv::Frame(b"first".to_vec()));
        transport.push_video(ScriptedRecv::Frame(b"never-sent".to_vec()));

        let shutdown = ShutdownController::new();
        let mut sink = CancellingSink {
            inner: VecSink::default(),
            shutdown: std::sync::Arc::clone(&shutdown),
        };
        let exit = run_video_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(sink.inner.chunks, vec![b"first".to_vec()]);
    }

    #[test]
    fn sink_write_failure_does_not_end_the_loop() {
        struct FailingSink {
            attempts: usize,
            closed: bool,
        }
        impl ByteSink for FailingSink {
            fn write_chunk(&mut self, _payload: &[u8]) -> std::io::Result<()> {
                self.attempts += 1;
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "reader went away",
                ))
            }
            fn close(&mut self) {
                self.closed = true;
            }
        }

        let transport = ScriptedTransport::new();
        transport.push_video(ScriptedRecv::Frame(b"a".to_vec()));
        transport.push_video(ScriptedRecv::Frame(b"b".to_vec()));
        transport.push_video(ScriptedRecv::Closed(CloseReason::RemoteTimeout));

        let shutdown = ShutdownController::new();
        let mut sink = FailingSink {
            attempts: 0,
            closed: false,
        };
        let exit = run_video_relay(
            &transport,
            StreamId(0),
            &mut sink,
            &shutdown,
            &fast_tuning(),
        );

        assert_eq!(exit, LoopExit::Closed(CloseReason::RemoteTimeout));
        assert_eq!(sink.attempts, 2);
        assert!(sink.closed);
    }

    #[test]
    fn one_loop_exiting_does_not_cancel_the_sibling() {
        let transport = ScriptedTransport::new();
        transport.push_video(ScriptedRecv::Closed(CloseReason::ClosedByRemote));
        transport.push_audio(ScriptedRecv::Frame(b"a1".to_vec()));
        transport.push_audio(ScriptedRecv::Frame(b"a2".to_vec()));
        transport.push_audio(ScriptedRecv::Closed(CloseReason::ClosedByRemote));

        let shutdown = ShutdownController::new();
        let tuning = fast_tuning();

        let mut video_sink = VecSink::default();
        let video_exit =
            run_video_relay(&transport, StreamId(0), &mut video_sink, &shutdown, &tuning);
        assert_eq!(video_exit, LoopExit::Closed(CloseReason::ClosedByRemote));

        // The video loop's terminal exit left the flag untouched; audio
        // keeps draining on its own terms.
        assert!(!shutdown.cancel_requested());
        let mut audio_sink = VecSink::default();
        let audio_exit =
            run_audio_relay(&transport, StreamId(0), &mut audio_sink, &shutdown, &tuning);
        assert_eq!(audio_exit, LoopExit::Closed(CloseReason::ClosedByRemote));
        assert_eq!(audio_sink.chunks.len(), 2);
    }
}

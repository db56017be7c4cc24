//! External transcoder process management.
//!
//! The relay never parses media itself; it hands both elementary streams to
//! an ffmpeg child over the named pipes and lets it publish RTSP. The child
//! is started after the pipes exist and killed unconditionally during
//! teardown, since a transcoder blocked on a half-open pipe will not exit on
//! its own.

use std::process::{Child, Command, Stdio};

use crate::config::{ConsumerConfig, SinkConfig};
use crate::errors::RelayError;

/// Seam over the downstream media consumer so session tests can run without
/// spawning a real process.
pub trait Consumer: Send {
    fn start(&mut self) -> Result<(), RelayError>;
    /// Stop the consumer. Must be idempotent and safe before `start`.
    fn terminate(&mut self);
}

/// ffmpeg child reading raw PCM and H.264 from the two pipes and pushing the
/// muxed result to an RTSP publish point.
pub struct FfmpegConsumer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl FfmpegConsumer {
    pub fn new(consumer: &ConsumerConfig, sinks: &SinkConfig) -> Self {
        Self {
            program: consumer.ffmpeg_path.clone(),
            args: build_args(consumer, sinks),
            child: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Input legs are raw elementary streams, so the formats and audio
/// parameters must be stated explicitly; nothing is probed.
fn build_args(consumer: &ConsumerConfig, sinks: &SinkConfig) -> Vec<String> {
    let queue = consumer.thread_queue_size.to_string();
    let rate = consumer.audio_sample_rate.to_string();
    let channels = consumer.audio_channels.to_string();
    [
        "-re",
        "-hide_banner",
        "-thread_queue_size",
        queue.as_str(),
        "-f",
        "s16le",
        "-ar",
        rate.as_str(),
        "-ac",
        channels.as_str(),
        "-i",
        sinks.audio_fifo.as_str(),
        "-thread_queue_size",
        queue.as_str(),
        "-f",
        "h264",
        "-i",
        sinks.video_fifo.as_str(),
        "-c:a",
        "aac",
        "-b:a",
        "32000",
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
        "-async",
        "1",
        "-f",
        "rtsp",
        "-rtsp_transport",
        "tcp",
        consumer.rtsp_url.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Consumer for FfmpegConsumer {
    fn start(&mut self) -> Result<(), RelayError> {
        if self.child.is_some() {
            return Ok(());
        }
        log::info!("starting {} {}", self.program, self.args.join(" "));
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| RelayError::Consumer(format!("failed to spawn {}: {e}", self.program)))?;
        log::info!("transcoder started, pid {}", child.id());
        self.child = Some(child);
        Ok(())
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            if let Err(e) = child.kill() {
                log::warn!("failed to kill transcoder pid {pid}: {e}");
            }
            match child.wait() {
                Ok(status) => log::info!("transcoder pid {pid} exited: {status}"),
                Err(e) => log::warn!("failed to reap transcoder pid {pid}: {e}"),
            }
        }
    }
}

impl Drop for FfmpegConsumer {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    #[test]
    fn argument_list_declares_both_raw_inputs() {
        let config = RelayConfig::default();
        let consumer = FfmpegConsumer::new(&config.consumer, &config.sinks);
        let args = consumer.args();

        let audio_pos = args.iter().position(|a| a == &config.sinks.audio_fifo);
        let video_pos = args.iter().position(|a| a == &config.sinks.video_fifo);
        assert!(audio_pos.is_some() && video_pos.is_some());
        assert!(audio_pos < video_pos, "audio leg comes first");

        let has_pair = |a: &str, b: &str| args.windows(2).any(|w| w[0] == a && w[1] == b);
        assert!(has_pair("-f", "s16le"));
        assert!(has_pair("-f", "h264"));
        assert!(has_pair("-ar", "8000"));
        assert_eq!(args.last().map(String::as_str), Some("rtsp://localhost:8554/stream"));
    }

    #[test]
    fn terminate_before_start_is_a_no_op() {
        let config = RelayConfig::default();
        let mut consumer = FfmpegConsumer::new(&config.consumer, &config.sinks);
        consumer.terminate();
        consumer.terminate();
    }

    #[test]
    fn start_with_a_missing_program_reports_a_consumer_error() {
        let config = RelayConfig::default();
        let bad = ConsumerConfig {
            ffmpeg_path: "/nonexistent/ffmpeg-definitely-missing".into(),
            ..config.consumer
        };
        let mut consumer = FfmpegConsumer::new(&bad, &config.sinks);
        let err = consumer.start().unwrap_err();
        assert!(matches!(err, RelayError::Consumer(_)));
    }
}

//! Relay configuration.
//!
//! Everything tunable lives in one TOML file (`camrelay.toml` next to the
//! binary by default). Defaults reproduce the known-good values for the
//! cameras this relay targets, so a missing file is not an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::relay::RelayTuning;
use crate::transport::Credentials;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub credentials: CredentialConfig,
    pub transport: TransportConfig,
    pub relay: LoopConfig,
    pub sinks: SinkConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path to the vendor AV/IOTC shared library, loaded at runtime.
    pub library_path: String,
    /// Maximum concurrent AV streams passed to the library's initializer.
    pub max_streams: u32,
    /// Stream start handshake timeout, in seconds.
    pub start_timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub poll_interval_ms: u64,
    pub audio_ready_threshold: usize,
    pub audio_max_frame: usize,
    pub video_max_frame: usize,
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub audio_fifo: String,
    pub video_fifo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub ffmpeg_path: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub rtsp_url: String,
    pub thread_queue_size: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            credentials: CredentialConfig::default(),
            transport: TransportConfig::default(),
            relay: LoopConfig::default(),
            sinks: SinkConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "123456".into(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            library_path: "libs/x64/libIOTCAPIs_ALL.so".into(),
            max_streams: 32,
            start_timeout_secs: 20,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            audio_ready_threshold: 25,
            audio_max_frame: 1024,
            video_max_frame: 128_000,
            maintenance_interval_secs: 60,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            audio_fifo: "fifos/audio_fifo".into(),
            video_fifo: "fifos/video_fifo".into(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            audio_sample_rate: 8000,
            audio_channels: 1,
            rtsp_url: "rtsp://localhost:8554/stream".into(),
            thread_queue_size: 4096,
        }
    }
}

impl RelayConfig {
    pub fn default_path() -> &'static str {
        "camrelay.toml"
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read {}: {e}", path.as_ref().display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse {}: {e}", path.as_ref().display()))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| format!("failed to write {}: {e}", path.as_ref().display()))
    }

    /// Load the config from `path`, falling back to defaults when the file
    /// does not exist. A present-but-invalid file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            log::info!(
                "no config at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.credentials.username.is_empty() {
            return Err("credentials.username must not be empty".into());
        }
        if self.transport.library_path.is_empty() {
            return Err("transport.library_path must not be empty".into());
        }
        if self.transport.max_streams == 0 {
            return Err("transport.max_streams must be at least 1".into());
        }
        if self.relay.poll_interval_ms == 0 {
            return Err("relay.poll_interval_ms must be at least 1".into());
        }
        if self.relay.audio_max_frame == 0 || self.relay.video_max_frame == 0 {
            return Err("relay frame ceilings must be non-zero".into());
        }
        if self.relay.maintenance_interval_secs == 0 {
            return Err("relay.maintenance_interval_secs must be at least 1".into());
        }
        if self.sinks.audio_fifo == self.sinks.video_fifo {
            return Err("sinks.audio_fifo and sinks.video_fifo must differ".into());
        }
        if self.consumer.audio_sample_rate == 0 || self.consumer.audio_channels == 0 {
            return Err("consumer audio parameters must be non-zero".into());
        }
        if self.consumer.rtsp_url.is_empty() {
            return Err("consumer.rtsp_url must not be empty".into());
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        }
    }

    pub fn tuning(&self) -> RelayTuning {
        RelayTuning {
            poll_interval: std::time::Duration::from_millis(self.relay.poll_interval_ms),
            audio_ready_threshold: self.relay.audio_ready_threshold,
            audio_max_frame: self.relay.audio_max_frame,
            video_max_frame: self.relay.video_max_frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relay.audio_ready_threshold, 25);
        assert_eq!(config.transport.start_timeout_secs, 20);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camrelay.toml");

        let mut config = RelayConfig::default();
        config.credentials.username = "operator".into();
        config.consumer.rtsp_url = "rtsp://127.0.0.1:9554/cam".into();
        config.save_to_file(&path).unwrap();

        let loaded = RelayConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.credentials.username, "operator");
        assert_eq!(loaded.consumer.rtsp_url, "rtsp://127.0.0.1:9554/cam");
        assert_eq!(loaded.relay.video_max_frame, 128_000);
    }

    #[test]
    fn load_or_default_falls_back_when_the_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.sinks.audio_fifo, "fifos/audio_fifo");
    }

    #[test]
    fn partial_files_inherit_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[relay]\npoll_interval_ms = 5\n").unwrap();

        let config = RelayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.relay.poll_interval_ms, 5);
        assert_eq!(config.relay.audio_ready_threshold, 25);
        assert_eq!(config.consumer.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn validation_rejects_colliding_fifo_paths() {
        let mut config = RelayConfig::default();
        config.sinks.video_fifo = config.sinks.audio_fifo.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tuning_converts_millis_to_durations() {
        let config = RelayConfig::default();
        let tuning = config.tuning();
        assert_eq!(tuning.poll_interval, std::time::Duration::from_millis(10));
        assert_eq!(tuning.audio_max_frame, 1024);
    }
}

//! Transport collaborator interface.
//!
//! The vendor session/transport SDK is an external black box: it owns device
//! discovery, authenticated session establishment, control command delivery
//! and buffered media receive. This module defines the seam the relay core
//! talks through, so the SDK-backed implementation ([`sdk::SdkTransport`])
//! and the scripted test double are interchangeable.
//!
//! Receive calls are non-blocking by contract: "no data yet" is a first-class
//! [`RecvResult::NotReady`] variant rather than an error, and callers drive a
//! fixed-interval poll around it.

use std::time::Duration;

pub mod sdk;

/// Raw codes returned by the vendor transport.
pub const AV_ER_DATA_NOREADY: i32 = -20012;
pub const AV_ER_LOSED_THIS_FRAME: i32 = -20014;
pub const AV_ER_SESSION_CLOSE_BY_REMOTE: i32 = -20015;
pub const AV_ER_REMOTE_TIMEOUT_DISCONNECT: i32 = -20016;
pub const IOTC_ER_INVALID_SID: i32 = -14;

/// Opaque identifier for one authenticated logical connection to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub i32);

/// Opaque index of one active audio+video stream bound to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Format-specific frame metadata. Opaque to the relay core; carried along
/// for logging and for consumers that care about codec or geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMeta {
    pub codec_id: u16,
    pub flags: u8,
    pub timestamp: u32,
    pub video_width: u32,
    pub video_height: u32,
}

/// One unit of relayed data. Produced by a receive call, written verbatim to
/// the corresponding sink, never buffered beyond the one in-flight chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameChunk {
    pub kind: MediaKind,
    pub payload: Vec<u8>,
    pub frame_no: u32,
    pub meta: FrameMeta,
}

/// Why the transport ended the session, from a relay loop's point of view.
/// All variants are terminal for the loop that observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClosedByRemote,
    RemoteTimeout,
    InvalidSession,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClosedByRemote => "session closed by remote",
            CloseReason::RemoteTimeout => "remote timeout disconnect",
            CloseReason::InvalidSession => "session id no longer valid",
        }
    }
}

/// Outcome of a single non-blocking receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvResult {
    Frame(FrameChunk),
    /// No buffered data. Callers sleep the poll interval and retry.
    NotReady,
    /// The frame was dropped inside the transport and is unrecoverable.
    /// Audio only; the loop skips it without writing.
    LostFrame,
    Closed(CloseReason),
}

/// Negotiated outputs of a successful stream start.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub stream: StreamId,
    pub resend_count: i32,
    pub server_type: u32,
}

/// AV credentials presented when starting a stream.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A device answering a bounded LAN search.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub address: String,
    pub port: u16,
}

/// The session/transport seam used by the relay core.
///
/// Setup calls return `Err(code)` with the raw transport code; the caller
/// maps codes to [`crate::RelayError`] variants. Receive calls classify their
/// own outcomes via [`RecvResult`]. `stop_stream` and `release_session` must
/// be safe to call after partial failure and are called at most once each by
/// the session manager's teardown.
pub trait Transport: Send + Sync {
    /// Acquire a free session slot from the transport.
    fn acquire_session(&self) -> Result<SessionId, i32>;

    /// Connect the acquired slot to a device. Returns the (possibly renumbered)
    /// session actually bound to the device.
    fn connect(&self, session: SessionId, device_id: &str) -> Result<SessionId, i32>;

    /// Start the authenticated media stream on a connected session.
    fn start_stream(
        &self,
        session: SessionId,
        credentials: &Credentials,
        timeout_secs: u32,
    ) -> Result<StreamInfo, i32>;

    /// Deliver one fixed-size control command identified by a numeric opcode.
    fn send_control(&self, stream: StreamId, opcode: u16, payload: &[u8]) -> Result<(), i32>;

    /// Number of buffered audio frames ready to be received. `Err` is
    /// terminal for the audio loop.
    fn audio_ready(&self, stream: StreamId) -> Result<usize, CloseReason>;

    /// Receive one buffered audio frame, at most `max_len` payload bytes.
    fn recv_audio(&self, stream: StreamId, max_len: usize) -> RecvResult;

    /// Receive one buffered video frame, at most `max_len` payload bytes.
    fn recv_video(&self, stream: StreamId, max_len: usize) -> RecvResult;

    /// Instruct the transport to reclaim its internal audio buffer.
    fn clean_audio_buf(&self, stream: StreamId);

    /// Instruct the transport to reclaim its internal video buffer.
    fn clean_video_buf(&self, stream: StreamId);

    /// Stop an active stream. Idempotent.
    fn stop_stream(&self, stream: StreamId);

    /// Release a session slot. Idempotent.
    fn release_session(&self, session: SessionId);

    /// Discover devices on the local network with a bounded wait.
    fn discover(&self, _wait: Duration) -> Vec<DiscoveredDevice> {
        Vec::new()
    }
}

/// Human-readable description for the transport error codes the vendor SDK
/// documents. Unknown codes get a generic description.
pub fn describe_error_code(code: i32) -> &'static str {
    match code {
        -1 => "master server does not respond; check the internet connection",
        -2 => "cannot resolve master hostname",
        -3 => "transport already initialized",
        -4 => "transport failed to create an internal mutex",
        -5 => "transport failed to create an internal thread",
        -10 => "this device id is unlicensed",
        -12 => "transport not initialized",
        -13 => "operation timed out",
        IOTC_ER_INVALID_SID => "session id is invalid",
        -18 => "maximum number of sessions reached; release a session first",
        -19 => "device is not registered on the server",
        -22 => "session closed by remote peer",
        -23 => "no acknowledgement from remote within timeout",
        -24 => "device is not listening or its session table is full",
        -26 => "channel is not switched on",
        -31 => "all session channels are occupied",
        -40 => "this device id's license does not support TCP",
        -41 => "network is unreachable",
        -42 => "cannot reach the device via LAN, P2P or relay",
        -43 => "server does not support UDP relay mode",
        AV_ER_DATA_NOREADY => "no buffered data ready",
        AV_ER_LOSED_THIS_FRAME => "frame lost inside the transport",
        AV_ER_SESSION_CLOSE_BY_REMOTE => "av session closed by remote peer",
        AV_ER_REMOTE_TIMEOUT_DISCONNECT => "av remote timeout disconnect",
        _ => "unknown transport error",
    }
}

/// Map a raw receive code onto the loop-terminal close reasons. `None` means
/// the code is not one of the documented terminal conditions.
pub fn close_reason_for_code(code: i32) -> Option<CloseReason> {
    match code {
        AV_ER_SESSION_CLOSE_BY_REMOTE => Some(CloseReason::ClosedByRemote),
        AV_ER_REMOTE_TIMEOUT_DISCONNECT => Some(CloseReason::RemoteTimeout),
        IOTC_ER_INVALID_SID => Some(CloseReason::InvalidSession),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_specific_descriptions() {
        assert!(describe_error_code(-18).contains("maximum number of sessions"));
        assert!(describe_error_code(AV_ER_SESSION_CLOSE_BY_REMOTE).contains("closed by remote"));
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(describe_error_code(-9999), "unknown transport error");
    }

    #[test]
    fn terminal_codes_map_to_close_reasons() {
        assert_eq!(
            close_reason_for_code(AV_ER_SESSION_CLOSE_BY_REMOTE),
            Some(CloseReason::ClosedByRemote)
        );
        assert_eq!(
            close_reason_for_code(AV_ER_REMOTE_TIMEOUT_DISCONNECT),
            Some(CloseReason::RemoteTimeout)
        );
        assert_eq!(
            close_reason_for_code(IOTC_ER_INVALID_SID),
            Some(CloseReason::InvalidSession)
        );
        assert_eq!(close_reason_for_code(AV_ER_DATA_NOREADY), None);
    }

    #[test]
    fn media_kind_labels() {
        assert_eq!(MediaKind::Audio.as_str(), "audio");
        assert_eq!(MediaKind::Video.as_str(), "video");
    }
}

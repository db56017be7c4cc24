//! Test doubles for the transport, consumer and sink seams.
//!
//! `ScriptedTransport` replays queued receive outcomes and records every call
//! it sees, so unit and integration tests can assert both relay behavior and
//! exact teardown ordering without a camera, a vendor library or an ffmpeg
//! binary on the machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::consumer::Consumer;
use crate::errors::RelayError;
use crate::shutdown::ShutdownController;
use crate::sink::ByteSink;
use crate::transport::{
    CloseReason, Credentials, DiscoveredDevice, FrameChunk, FrameMeta, MediaKind, RecvResult,
    SessionId, StreamId, StreamInfo, Transport,
};

/// Everything observable a collaborator did, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AcquireSession,
    Connect(String),
    StartStream,
    Control(u16),
    StopStream,
    ReleaseSession,
    CleanAudio,
    CleanVideo,
    ConsumerStarted,
    ConsumerTerminated,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// One scripted receive outcome.
#[derive(Debug, Clone)]
pub enum ScriptedRecv {
    Frame(Vec<u8>),
    NotReady,
    LostFrame,
    Closed(CloseReason),
    /// Deliver a frame and trigger an interrupt on the controller installed
    /// via [`ScriptedTransport::interrupt_on_recv`], to exercise mid-stream
    /// shutdown without real signals.
    Interrupt(Vec<u8>),
}

#[derive(Default)]
struct ScriptState {
    audio: VecDeque<ScriptedRecv>,
    video: VecDeque<ScriptedRecv>,
    audio_ready: VecDeque<Result<usize, CloseReason>>,
    fail_acquire: Option<i32>,
    fail_connect: Option<i32>,
    fail_start: Option<i32>,
    /// Fail the nth control command (0-based) with the given code.
    fail_control: Option<(usize, i32)>,
    controls_seen: usize,
    next_frame_no: u32,
    /// When the video script runs dry, keep answering `NotReady` instead of
    /// closing, for tests that end the stream from the audio side or via an
    /// interrupt.
    endless_video_not_ready: bool,
}

/// Scripted [`Transport`] double with an event log.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
    events: Mutex<Vec<Event>>,
    shared_log: Mutex<Option<EventLog>>,
    interrupt: Mutex<Option<Arc<ShutdownController>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror recorded events into a log shared with other doubles, so a test
    /// can assert cross-collaborator ordering.
    pub fn share_log(&self, log: EventLog) {
        *self.shared_log.lock().unwrap() = Some(log);
    }

    pub fn push_audio(&self, item: ScriptedRecv) {
        self.state.lock().unwrap().audio.push_back(item);
    }

    pub fn push_video(&self, item: ScriptedRecv) {
        self.state.lock().unwrap().video.push_back(item);
    }

    pub fn push_audio_ready(&self, item: Result<usize, CloseReason>) {
        self.state.lock().unwrap().audio_ready.push_back(item);
    }

    pub fn fail_acquire(&self, code: i32) {
        self.state.lock().unwrap().fail_acquire = Some(code);
    }

    pub fn fail_connect(&self, code: i32) {
        self.state.lock().unwrap().fail_connect = Some(code);
    }

    pub fn fail_start(&self, code: i32) {
        self.state.lock().unwrap().fail_start = Some(code);
    }

    pub fn fail_control_at(&self, index: usize, code: i32) {
        self.state.lock().unwrap().fail_control = Some((index, code));
    }

    pub fn endless_video_not_ready(&self) {
        self.state.lock().unwrap().endless_video_not_ready = true;
    }

    pub fn interrupt_on_recv(&self, shutdown: Arc<ShutdownController>) {
        *self.interrupt.lock().unwrap() = Some(shutdown);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event.clone());
        if let Some(log) = self.shared_log.lock().unwrap().as_ref() {
            log.lock().unwrap().push(event);
        }
    }

    fn play(&self, kind: MediaKind, max_len: usize) -> RecvResult {
        let mut state = self.state.lock().unwrap();
        let (queue, endless) = match kind {
            MediaKind::Audio => (&mut state.audio, false),
            MediaKind::Video => {
                let endless = state.endless_video_not_ready;
                (&mut state.video, endless)
            }
        };
        let item = match queue.pop_front() {
            Some(item) => item,
            None if endless => return RecvResult::NotReady,
            None => return RecvResult::Closed(CloseReason::ClosedByRemote),
        };
        match item {
            ScriptedRecv::Frame(payload) => {
                state.next_frame_no += 1;
                frame(kind, payload, state.next_frame_no, max_len)
            }
            ScriptedRecv::NotReady => RecvResult::NotReady,
            ScriptedRecv::LostFrame => RecvResult::LostFrame,
            ScriptedRecv::Closed(reason) => RecvResult::Closed(reason),
            ScriptedRecv::Interrupt(payload) => {
                state.next_frame_no += 1;
                let result = frame(kind, payload, state.next_frame_no, max_len);
                drop(state);
                if let Some(shutdown) = self.interrupt.lock().unwrap().as_ref() {
                    shutdown.request_interrupt();
                }
                result
            }
        }
    }
}

fn frame(kind: MediaKind, mut payload: Vec<u8>, frame_no: u32, max_len: usize) -> RecvResult {
    payload.truncate(max_len);
    RecvResult::Frame(FrameChunk {
        kind,
        payload,
        frame_no,
        meta: FrameMeta::default(),
    })
}

impl Transport for ScriptedTransport {
    fn acquire_session(&self) -> Result<SessionId, i32> {
        self.record(Event::AcquireSession);
        match self.state.lock().unwrap().fail_acquire {
            Some(code) => Err(code),
            None => Ok(SessionId(7)),
        }
    }

    fn connect(&self, session: SessionId, device_id: &str) -> Result<SessionId, i32> {
        self.record(Event::Connect(device_id.to_string()));
        match self.state.lock().unwrap().fail_connect {
            Some(code) => Err(code),
            None => Ok(session),
        }
    }

    fn start_stream(
        &self,
        _session: SessionId,
        _credentials: &Credentials,
        _timeout_secs: u32,
    ) -> Result<StreamInfo, i32> {
        self.record(Event::StartStream);
        match self.state.lock().unwrap().fail_start {
            Some(code) => Err(code),
            None => Ok(StreamInfo {
                stream: StreamId(0),
                resend_count: 1,
                server_type: 0,
            }),
        }
    }

    fn send_control(&self, _stream: StreamId, opcode: u16, _payload: &[u8]) -> Result<(), i32> {
        self.record(Event::Control(opcode));
        let mut state = self.state.lock().unwrap();
        let index = state.controls_seen;
        state.controls_seen += 1;
        match state.fail_control {
            Some((at, code)) if at == index => Err(code),
            _ => Ok(()),
        }
    }

    fn audio_ready(&self, _stream: StreamId) -> Result<usize, CloseReason> {
        self.state
            .lock()
            .unwrap()
            .audio_ready
            .pop_front()
            // Unscripted checks report plenty buffered, so the gate passes.
            .unwrap_or(Ok(usize::MAX))
    }

    fn recv_audio(&self, _stream: StreamId, max_len: usize) -> RecvResult {
        self.play(MediaKind::Audio, max_len)
    }

    fn recv_video(&self, _stream: StreamId, max_len: usize) -> RecvResult {
        self.play(MediaKind::Video, max_len)
    }

    fn clean_audio_buf(&self, _stream: StreamId) {
        self.record(Event::CleanAudio);
    }

    fn clean_video_buf(&self, _stream: StreamId) {
        self.record(Event::CleanVideo);
    }

    fn stop_stream(&self, _stream: StreamId) {
        self.record(Event::StopStream);
    }

    fn release_session(&self, _session: SessionId) {
        self.record(Event::ReleaseSession);
    }

    fn discover(&self, _wait: Duration) -> Vec<DiscoveredDevice> {
        Vec::new()
    }
}

/// Consumer double that only records lifecycle calls.
#[derive(Default)]
pub struct NullConsumer {
    pub started: bool,
    pub terminated: bool,
    log: Option<EventLog>,
    fail_start: bool,
}

impl NullConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    fn record(&self, event: Event) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(event);
        }
    }
}

impl Consumer for NullConsumer {
    fn start(&mut self) -> Result<(), RelayError> {
        if self.fail_start {
            return Err(RelayError::Consumer("scripted start failure".into()));
        }
        self.started = true;
        self.record(Event::ConsumerStarted);
        Ok(())
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.record(Event::ConsumerTerminated);
    }
}

/// In-memory [`ByteSink`] capturing every written chunk.
#[derive(Debug, Default)]
pub struct VecSink {
    pub chunks: Vec<Vec<u8>>,
    pub closed: bool,
}

impl ByteSink for VecSink {
    fn write_chunk(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.chunks.push(payload.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

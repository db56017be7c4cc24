//! Vendor SDK transport, loaded at runtime.
//!
//! The vendor ships the session/transport layer as a prebuilt shared library
//! (`libIOTCAPIs_ALL.so`). Linking against it at build time would make the
//! crate unbuildable without the blob, so the library is opened with
//! `libloading` and the needed symbols are resolved once at startup; a
//! missing library or symbol is a startup error, not a build error.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::Path;
use std::time::Duration;

use libloading::Library;

use crate::errors::RelayError;
use crate::transport::{
    close_reason_for_code, CloseReason, Credentials, DiscoveredDevice, FrameChunk, FrameMeta,
    MediaKind, RecvResult, SessionId, StreamId, StreamInfo, Transport, AV_ER_DATA_NOREADY,
    AV_ER_LOSED_THIS_FRAME,
};

/// Per-frame metadata block as laid out by the vendor SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct RawFrameInfo {
    codec_id: u16,
    flags: u8,
    cam_index: u8,
    online_num: u8,
    reserve1: [u8; 3],
    reserve2: u32,
    timestamp: u32,
    video_width: u32,
    video_height: u32,
}

/// LAN search result record as laid out by the vendor SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawLanSearchInfo {
    uid: [u8; 21],
    ip: [u8; 16],
    port: u16,
    reserved: u8,
}

impl Default for RawLanSearchInfo {
    fn default() -> Self {
        Self {
            uid: [0; 21],
            ip: [0; 16],
            port: 0,
            reserved: 0,
        }
    }
}

type IotcInitialize2 = unsafe extern "C" fn(c_int) -> c_int;
type IotcDeinitialize = unsafe extern "C" fn() -> c_int;
type IotcGetSessionId = unsafe extern "C" fn() -> c_int;
type IotcConnectByUidParallel = unsafe extern "C" fn(*const c_char, c_int) -> c_int;
type IotcSessionClose = unsafe extern "C" fn(c_int);
type IotcLanSearch = unsafe extern "C" fn(*mut RawLanSearchInfo, c_int, c_int) -> c_int;
type AvInitialize = unsafe extern "C" fn(c_int) -> c_int;
type AvDeinitialize = unsafe extern "C" fn() -> c_int;
type AvClientStart2 = unsafe extern "C" fn(
    c_int,
    *const c_char,
    *const c_char,
    c_int,
    *mut c_uint,
    c_int,
    *mut c_int,
) -> c_int;
type AvClientStop = unsafe extern "C" fn(c_int);
type AvSendIoctrl = unsafe extern "C" fn(c_int, c_uint, *const c_char, c_int) -> c_int;
type AvRecvAudioData =
    unsafe extern "C" fn(c_int, *mut c_char, c_int, *mut RawFrameInfo, c_int, *mut c_uint) -> c_int;
type AvRecvFrameData2 = unsafe extern "C" fn(
    c_int,
    *mut c_char,
    c_int,
    *mut c_int,
    *mut c_int,
    *mut c_char,
    c_int,
    *mut c_int,
    *mut c_uint,
) -> c_int;
type AvCheckAudioBuf = unsafe extern "C" fn(c_int) -> c_int;
type AvClientCleanBuf = unsafe extern "C" fn(c_int) -> c_int;

/// Resolved entry points into the vendor library. The function pointers stay
/// valid for as long as `_lib` is kept alive, which the struct guarantees.
struct SdkApi {
    iotc_initialize2: IotcInitialize2,
    iotc_deinitialize: IotcDeinitialize,
    iotc_get_session_id: IotcGetSessionId,
    iotc_connect_by_uid_parallel: IotcConnectByUidParallel,
    iotc_session_close: IotcSessionClose,
    iotc_lan_search: IotcLanSearch,
    av_initialize: AvInitialize,
    av_deinitialize: AvDeinitialize,
    av_client_start2: AvClientStart2,
    av_client_stop: AvClientStop,
    av_send_ioctrl: AvSendIoctrl,
    av_recv_audio_data: AvRecvAudioData,
    av_recv_frame_data2: AvRecvFrameData2,
    av_check_audio_buf: AvCheckAudioBuf,
    av_client_clean_video_buf: AvClientCleanBuf,
    av_client_clean_audio_buf: AvClientCleanBuf,
    _lib: Library,
}

fn resolve<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, RelayError> {
    // SAFETY: the caller picks a fn-pointer type matching the vendor ABI; the
    // pointer is only used while the library stays loaded inside SdkApi.
    unsafe {
        lib.get::<T>(name).map(|sym| *sym).map_err(|e| {
            RelayError::TransportUnavailable(format!(
                "missing symbol `{}`: {e}",
                String::from_utf8_lossy(&name[..name.len().saturating_sub(1)])
            ))
        })
    }
}

impl SdkApi {
    fn load(path: &Path) -> Result<Self, RelayError> {
        // SAFETY: loading a foreign library runs its initializers; the vendor
        // blob is trusted the same way the original client trusted it.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            RelayError::TransportUnavailable(format!(
                "failed to load vendor library {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self {
            iotc_initialize2: resolve(&lib, b"IOTC_Initialize2\0")?,
            iotc_deinitialize: resolve(&lib, b"IOTC_DeInitialize\0")?,
            iotc_get_session_id: resolve(&lib, b"IOTC_Get_SessionID\0")?,
            iotc_connect_by_uid_parallel: resolve(&lib, b"IOTC_Connect_ByUID_Parallel\0")?,
            iotc_session_close: resolve(&lib, b"IOTC_Session_Close\0")?,
            iotc_lan_search: resolve(&lib, b"IOTC_Lan_Search\0")?,
            av_initialize: resolve(&lib, b"avInitialize\0")?,
            av_deinitialize: resolve(&lib, b"avDeInitialize\0")?,
            av_client_start2: resolve(&lib, b"avClientStart2\0")?,
            av_client_stop: resolve(&lib, b"avClientStop\0")?,
            av_send_ioctrl: resolve(&lib, b"avSendIOCtrl\0")?,
            av_recv_audio_data: resolve(&lib, b"avRecvAudioData\0")?,
            av_recv_frame_data2: resolve(&lib, b"avRecvFrameData2\0")?,
            av_check_audio_buf: resolve(&lib, b"avCheckAudioBuf\0")?,
            av_client_clean_video_buf: resolve(&lib, b"avClientCleanVideoBuf\0")?,
            av_client_clean_audio_buf: resolve(&lib, b"avClientCleanAudioBuf\0")?,
            _lib: lib,
        })
    }
}

/// [`Transport`] implementation backed by the runtime-loaded vendor SDK.
///
/// Initializes the transport on load (with a concurrency limit) and
/// deinitializes it on drop. One instance per process.
pub struct SdkTransport {
    api: SdkApi,
}

impl SdkTransport {
    /// Load the vendor library and initialize the transport with the given
    /// maximum number of concurrent AV streams.
    pub fn load<P: AsRef<Path>>(library_path: P, max_streams: u32) -> Result<Self, RelayError> {
        let library_path = library_path.as_ref();
        let api = SdkApi::load(library_path)?;

        // SAFETY: symbols were resolved from the loaded library above.
        let ret = unsafe { (api.iotc_initialize2)(0) };
        if ret != 0 {
            return Err(RelayError::TransportUnavailable(format!(
                "transport initialization failed [{ret}]"
            )));
        }
        // SAFETY: as above; avInitialize has no failure mode of interest here.
        unsafe { (api.av_initialize)(max_streams as c_int) };

        log::info!(
            "vendor transport loaded from {} (max {max_streams} streams)",
            library_path.display()
        );
        Ok(Self { api })
    }

    fn meta_from_raw(raw: &RawFrameInfo) -> FrameMeta {
        FrameMeta {
            codec_id: raw.codec_id,
            flags: raw.flags,
            timestamp: raw.timestamp,
            video_width: raw.video_width,
            video_height: raw.video_height,
        }
    }

    fn classify_recv(kind: MediaKind, code: i32) -> RecvResult {
        if let Some(reason) = close_reason_for_code(code) {
            return RecvResult::Closed(reason);
        }
        match code {
            AV_ER_DATA_NOREADY => RecvResult::NotReady,
            AV_ER_LOSED_THIS_FRAME => RecvResult::LostFrame,
            other => {
                // Undocumented negative codes are treated as transient.
                log::warn!("{} receive returned unexpected code [{other}]", kind.as_str());
                RecvResult::NotReady
            }
        }
    }
}

impl Drop for SdkTransport {
    fn drop(&mut self) {
        // SAFETY: mirrors the init sequence in `load`, in reverse order.
        unsafe {
            (self.api.av_deinitialize)();
            (self.api.iotc_deinitialize)();
        }
    }
}

impl Transport for SdkTransport {
    fn acquire_session(&self) -> Result<SessionId, i32> {
        // SAFETY: resolved symbol, no pointer arguments.
        let sid = unsafe { (self.api.iotc_get_session_id)() };
        if sid < 0 {
            return Err(sid);
        }
        Ok(SessionId(sid))
    }

    fn connect(&self, session: SessionId, device_id: &str) -> Result<SessionId, i32> {
        let uid = CString::new(device_id).map_err(|_| IOTC_ER_INVALID_ARG)?;
        // SAFETY: `uid` is a valid NUL-terminated string for the call duration.
        let sid = unsafe { (self.api.iotc_connect_by_uid_parallel)(uid.as_ptr(), session.0) };
        if sid < 0 {
            return Err(sid);
        }
        Ok(SessionId(sid))
    }

    fn start_stream(
        &self,
        session: SessionId,
        credentials: &Credentials,
        timeout_secs: u32,
    ) -> Result<StreamInfo, i32> {
        let user = CString::new(credentials.username.as_str()).map_err(|_| IOTC_ER_INVALID_ARG)?;
        let pass = CString::new(credentials.password.as_str()).map_err(|_| IOTC_ER_INVALID_ARG)?;
        let mut server_type: c_uint = 0;
        let mut resend: c_int = -1;
        // SAFETY: all pointers reference locals that outlive the call.
        let index = unsafe {
            (self.api.av_client_start2)(
                session.0,
                user.as_ptr(),
                pass.as_ptr(),
                timeout_secs as c_int,
                &mut server_type,
                0,
                &mut resend,
            )
        };
        if index < 0 {
            return Err(index);
        }
        Ok(StreamInfo {
            stream: StreamId(index),
            resend_count: resend,
            server_type,
        })
    }

    fn send_control(&self, stream: StreamId, opcode: u16, payload: &[u8]) -> Result<(), i32> {
        // SAFETY: `payload` stays borrowed for the duration of the call.
        let ret = unsafe {
            (self.api.av_send_ioctrl)(
                stream.0,
                opcode as c_uint,
                payload.as_ptr() as *const c_char,
                payload.len() as c_int,
            )
        };
        if ret < 0 {
            return Err(ret);
        }
        Ok(())
    }

    fn audio_ready(&self, stream: StreamId) -> Result<usize, CloseReason> {
        // SAFETY: resolved symbol, no pointer arguments.
        let ret = unsafe { (self.api.av_check_audio_buf)(stream.0) };
        if ret < 0 {
            return Err(close_reason_for_code(ret).unwrap_or(CloseReason::InvalidSession));
        }
        Ok(ret as usize)
    }

    fn recv_audio(&self, stream: StreamId, max_len: usize) -> RecvResult {
        // Fresh payload buffer per iteration; no aliasing across receives.
        let mut buf = vec![0u8; max_len];
        let mut info = RawFrameInfo::default();
        let mut frame_no: c_uint = 0;
        // SAFETY: buffer, frame info and frame number outlive the call and
        // their sizes are passed alongside.
        let ret = unsafe {
            (self.api.av_recv_audio_data)(
                stream.0,
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as c_int,
                &mut info,
                std::mem::size_of::<RawFrameInfo>() as c_int,
                &mut frame_no,
            )
        };
        if ret < 0 {
            return Self::classify_recv(MediaKind::Audio, ret);
        }
        buf.truncate(ret as usize);
        RecvResult::Frame(FrameChunk {
            kind: MediaKind::Audio,
            payload: buf,
            frame_no,
            meta: Self::meta_from_raw(&info),
        })
    }

    fn recv_video(&self, stream: StreamId, max_len: usize) -> RecvResult {
        let mut buf = vec![0u8; max_len];
        let mut info = RawFrameInfo::default();
        let mut frame_no: c_uint = 0;
        let mut out_buf_size: c_int = 0;
        let mut out_frame_size: c_int = 0;
        let mut out_info_size: c_int = 0;
        // SAFETY: as in `recv_audio`; the frame info block is passed as the
        // raw byte pointer the vendor signature expects.
        let ret = unsafe {
            (self.api.av_recv_frame_data2)(
                stream.0,
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as c_int,
                &mut out_buf_size,
                &mut out_frame_size,
                &mut info as *mut RawFrameInfo as *mut c_char,
                std::mem::size_of::<RawFrameInfo>() as c_int,
                &mut out_info_size,
                &mut frame_no,
            )
        };
        if ret < 0 {
            return Self::classify_recv(MediaKind::Video, ret);
        }
        buf.truncate(ret as usize);
        RecvResult::Frame(FrameChunk {
            kind: MediaKind::Video,
            payload: buf,
            frame_no,
            meta: Self::meta_from_raw(&info),
        })
    }

    fn clean_audio_buf(&self, stream: StreamId) {
        // SAFETY: resolved symbol, no pointer arguments.
        unsafe { (self.api.av_client_clean_audio_buf)(stream.0) };
    }

    fn clean_video_buf(&self, stream: StreamId) {
        // SAFETY: resolved symbol, no pointer arguments.
        unsafe { (self.api.av_client_clean_video_buf)(stream.0) };
    }

    fn stop_stream(&self, stream: StreamId) {
        // SAFETY: resolved symbol, no pointer arguments.
        unsafe { (self.api.av_client_stop)(stream.0) };
        log::info!("av client stopped (stream {})", stream.0);
    }

    fn release_session(&self, session: SessionId) {
        // SAFETY: resolved symbol, no pointer arguments.
        unsafe { (self.api.iotc_session_close)(session.0) };
        log::info!("session {} closed", session.0);
    }

    fn discover(&self, wait: Duration) -> Vec<DiscoveredDevice> {
        const MAX_RESULTS: usize = 12;
        let mut slots = [RawLanSearchInfo::default(); MAX_RESULTS];
        // SAFETY: `slots` outlives the call and its capacity is passed along.
        let found = unsafe {
            (self.api.iotc_lan_search)(
                slots.as_mut_ptr(),
                MAX_RESULTS as c_int,
                wait.as_millis() as c_int,
            )
        };
        if found <= 0 {
            return Vec::new();
        }
        slots[..(found as usize).min(MAX_RESULTS)]
            .iter()
            .map(|slot| DiscoveredDevice {
                device_id: cstr_field(&slot.uid),
                address: cstr_field(&slot.ip),
                port: slot.port,
            })
            .collect()
    }
}

// Interior NUL in a device id or credential can never match a real device;
// reported with the transport's own invalid-argument-style code.
const IOTC_ER_INVALID_ARG: i32 = -39;

fn cstr_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_info_matches_vendor_layout() {
        assert_eq!(std::mem::size_of::<RawFrameInfo>(), 24);
    }

    #[test]
    fn cstr_field_stops_at_nul() {
        let mut uid = [0u8; 21];
        uid[..6].copy_from_slice(b"CAM123");
        assert_eq!(cstr_field(&uid), "CAM123");
        assert_eq!(cstr_field(&[0u8; 16]), "");
    }

    #[test]
    fn classify_maps_documented_codes() {
        assert_eq!(
            SdkTransport::classify_recv(MediaKind::Video, AV_ER_DATA_NOREADY),
            RecvResult::NotReady
        );
        assert_eq!(
            SdkTransport::classify_recv(MediaKind::Audio, AV_ER_LOSED_THIS_FRAME),
            RecvResult::LostFrame
        );
        assert_eq!(
            SdkTransport::classify_recv(MediaKind::Audio, crate::transport::IOTC_ER_INVALID_SID),
            RecvResult::Closed(CloseReason::InvalidSession)
        );
    }

    #[test]
    fn loading_a_missing_library_is_a_startup_error() {
        let err = SdkTransport::load(Path::new("/nonexistent/libIOTCAPIs_ALL.so"), 2)
            .err()
            .expect("load must fail");
        assert!(matches!(err, RelayError::TransportUnavailable(_)));
    }
}

use std::io;

use crate::transport::describe_error_code;

/// Errors surfaced by the relay core.
///
/// Setup errors (slot, connect, stream start, control command) are terminal
/// for a run: no retry happens inside the core, and the operator decides
/// whether to invoke the process again.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("no transport session slot available [{0}]")]
    SessionAcquisition(i32),

    #[error("connect to device `{device}` failed [{code}]")]
    Connect { device: String, code: i32 },

    #[error("stream start failed [{code}]")]
    StreamStart { code: i32 },

    #[error("setup command {opcode:#06x} ({label}) failed [{code}]")]
    ControlCommand {
        opcode: u16,
        label: &'static str,
        code: i32,
    },

    #[error("transport library unavailable: {0}")]
    TransportUnavailable(String),

    #[error("consumer process error: {0}")]
    Consumer(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Raw transport error code carried by this error, if any.
    pub fn transport_code(&self) -> Option<i32> {
        match self {
            RelayError::SessionAcquisition(code) => Some(*code),
            RelayError::Connect { code, .. } => Some(*code),
            RelayError::StreamStart { code } => Some(*code),
            RelayError::ControlCommand { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Human-readable description of the transport error code, when one is
    /// known for it. Used for operator diagnostics next to `Display`.
    pub fn describe(&self) -> Option<&'static str> {
        self.transport_code().map(describe_error_code)
    }
}

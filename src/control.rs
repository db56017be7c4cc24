//! Control command identifiers and wire payloads.
//!
//! Commands are fixed-size little-endian structures delivered through the
//! transport's IOCtrl channel. The setup sequence is strictly ordered; a
//! failure anywhere aborts stream startup.

/// Night-vision / gray mode request.
pub const IOTYPE_SET_GRAY_MODE: u16 = 0x5000;
/// Stream quality request.
pub const IOTYPE_SET_STREAM_CTRL: u16 = 0x0320;
/// Start the camera's video stream.
pub const IOTYPE_START_VIDEO: u16 = 0x01FF;
/// Stop the camera's video stream.
pub const IOTYPE_STOP_VIDEO: u16 = 0x02FF;
/// Start the camera's audio stream.
pub const IOTYPE_START_AUDIO: u16 = 0x0300;

/// Payload of [`IOTYPE_SET_GRAY_MODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetVideoMode {
    pub channel: u32,
    pub mode: u32,
}

impl SetVideoMode {
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.channel.to_le_bytes());
        buf[4..].copy_from_slice(&self.mode.to_le_bytes());
        buf
    }
}

/// Payload of [`IOTYPE_SET_STREAM_CTRL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStreamQuality {
    pub channel: u32,
    pub quality: u32,
}

impl SetStreamQuality {
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.channel.to_le_bytes());
        buf[4..].copy_from_slice(&self.quality.to_le_bytes());
        buf
    }
}

/// Payload of the AV start/stop commands: a channel plus reserved padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvStreamCtrl {
    pub channel: u32,
}

impl AvStreamCtrl {
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.channel.to_le_bytes());
        buf
    }
}

/// One command of the stream-setup sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub opcode: u16,
    pub label: &'static str,
    pub payload: Vec<u8>,
}

/// The fixed, strictly ordered command sequence issued after stream start
/// and before any media loop runs. Each command must succeed before the next
/// is sent; no partial start may proceed to the streaming phase.
pub fn setup_sequence() -> Vec<ControlCommand> {
    vec![
        ControlCommand {
            opcode: IOTYPE_SET_GRAY_MODE,
            label: "disable night-vision",
            payload: SetVideoMode { channel: 1, mode: 1 }.to_bytes().to_vec(),
        },
        ControlCommand {
            opcode: IOTYPE_SET_STREAM_CTRL,
            label: "set stream quality",
            payload: SetStreamQuality {
                channel: 0,
                quality: 2,
            }
            .to_bytes()
            .to_vec(),
        },
        ControlCommand {
            opcode: IOTYPE_START_VIDEO,
            label: "start video",
            payload: AvStreamCtrl::default().to_bytes().to_vec(),
        },
        ControlCommand {
            opcode: IOTYPE_START_AUDIO,
            label: "start audio",
            payload: AvStreamCtrl::default().to_bytes().to_vec(),
        },
    ]
}

/// Best-effort stop command sent first during teardown.
pub fn stop_command() -> ControlCommand {
    ControlCommand {
        opcode: IOTYPE_STOP_VIDEO,
        label: "stop stream",
        payload: AvStreamCtrl::default().to_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_are_little_endian_fixed_size() {
        let bytes = SetVideoMode { channel: 1, mode: 1 }.to_bytes();
        assert_eq!(bytes, [1, 0, 0, 0, 1, 0, 0, 0]);

        let bytes = SetStreamQuality {
            channel: 0,
            quality: 2,
        }
        .to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 2, 0, 0, 0]);

        assert_eq!(AvStreamCtrl::default().to_bytes(), [0u8; 8]);
    }

    #[test]
    fn setup_sequence_order_is_fixed() {
        let opcodes: Vec<u16> = setup_sequence().iter().map(|c| c.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                IOTYPE_SET_GRAY_MODE,
                IOTYPE_SET_STREAM_CTRL,
                IOTYPE_START_VIDEO,
                IOTYPE_START_AUDIO,
            ]
        );
    }

    #[test]
    fn stop_command_uses_the_stop_opcode() {
        let cmd = stop_command();
        assert_eq!(cmd.opcode, IOTYPE_STOP_VIDEO);
        assert_eq!(cmd.payload.len(), 8);
    }
}

//! Radio wire framing: preamble + channel + opcode + payload (§6).

use heapless::Vec;

use crate::command::{Command, MAX_PAYLOAD};
use crate::opcode::Opcode;

/// Constant first byte of every LoRa packet produced by this protocol.
pub const PREAMBLE: u8 = 0x42;

pub const HEADER_SIZE: usize = 3;
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD;

pub type FrameBytes = Vec<u8, MAX_FRAME_SIZE>;

/// Serialize `cmd` into a full LoRa frame for `channel` (§6).
pub fn encode_frame(channel: u8, cmd: &Command) -> FrameBytes {
    let mut out = FrameBytes::new();
    let _ = out.push(PREAMBLE);
    let _ = out.push(channel);
    let _ = out.push(cmd.opcode().into());
    let _ = out.extend_from_slice(&cmd.encode_payload());
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    /// Not our preamble, or on a different channel — dropped silently by
    /// the transport per §4.5, kept here only so tests can assert it.
    NotOurs,
    UnknownOpcode(u8),
}

/// Validate and split a received frame's header from its payload. Frames
/// whose preamble or channel do not match are `FrameError::NotOurs`,
/// silently dropped by the caller (§4.5, §7) — not surfaced as an error.
pub fn decode_frame(bytes: &[u8], expected_channel: u8) -> Result<(Opcode, &[u8]), FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::TooShort);
    }
    if bytes[0] != PREAMBLE || bytes[1] != expected_channel {
        return Err(FrameError::NotOurs);
    }
    let opcode = Opcode::try_from(bytes[2]).map_err(|e| FrameError::UnknownOpcode(e.0))?;
    Ok((opcode, &bytes[HEADER_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let cmd = Command::MenuDelay {
            delay_ms: 1_200,
            sync: Some(true),
        };
        let frame = encode_frame(7, &cmd);
        let (opcode, payload) = decode_frame(&frame, 7).unwrap();
        assert_eq!(opcode, cmd.opcode());
        assert_eq!(Command::decode(opcode, payload).unwrap(), cmd);
    }

    #[test]
    fn wrong_channel_is_dropped_silently() {
        let frame = encode_frame(7, &Command::Trigger);
        assert_eq!(decode_frame(&frame, 8), Err(FrameError::NotOurs));
    }

    #[test]
    fn bad_preamble_is_dropped_silently() {
        let mut frame = encode_frame(7, &Command::Trigger);
        frame[0] = 0x00;
        assert_eq!(decode_frame(&frame, 7), Err(FrameError::NotOurs));
    }

    #[test]
    fn channel_254_is_valid_255_never_produced() {
        let frame = encode_frame(254, &Command::Trigger);
        assert!(decode_frame(&frame, 254).is_ok());
        assert_eq!(frame[1], 254);
    }
}

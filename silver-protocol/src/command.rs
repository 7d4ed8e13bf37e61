//! Opcode + payload framing for a single command (§3.3).

use heapless::Vec;

use crate::opcode::{Opcode, UnknownOpcode};
use crate::settings::InputMode;
use crate::time::{decode_ms, encode_ms};

/// Payload bytes beyond the 3-byte header (§6).
pub const MAX_PAYLOAD: usize = 10;

pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// A decoded command: either a settings-group edit or an action. Settings
/// commands carry `sync: Option<bool>` because two payload lengths are
/// accepted on the wire per §9's Open Questions — the short form omits the
/// trailing sync byte (as sent by a peer radio), the long form carries it
/// (as sent by USB, and as always emitted toward USB by the coordinator).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub enum Command {
    MenuTrigger {
        focus_hold: bool,
        trigger_hold: bool,
        sync: Option<bool>,
    },
    MenuDelay {
        delay_ms: u32,
        sync: Option<bool>,
    },
    MenuInterval {
        n_shots: u8,
        delay_ms: u32,
        sync: Option<bool>,
    },
    MenuTimings {
        focus_ms: u32,
        trigger_ms: u32,
        sync: Option<bool>,
    },
    MenuInput {
        mode: InputMode,
        sync: Option<bool>,
    },
    /// USB only (§4.4.2, §6).
    MenuSettings {
        sync_channel: u8,
    },
    Focus,
    FocusHold,
    FocusRelease,
    Trigger,
    TriggerNoDelay,
    TriggerHold,
    TriggerRelease,
}

/// A payload failed to decode against its opcode's expected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub enum DecodeError {
    UnknownOpcode(u8),
    PayloadTooShort { opcode: Opcode, got: usize, want: usize },
    /// `GET_GUI_STATE`/`GET_GUI_UPDATE` are USB IN-only queries, never a
    /// settings/action `Command` (§3.3).
    NotACommandOpcode(Opcode),
}

impl From<UnknownOpcode> for DecodeError {
    fn from(e: UnknownOpcode) -> Self {
        DecodeError::UnknownOpcode(e.0)
    }
}

fn want(opcode: Opcode, got: usize, want: usize) -> Result<(), DecodeError> {
    if got < want {
        Err(DecodeError::PayloadTooShort { opcode, got, want })
    } else {
        Ok(())
    }
}

fn push_u24(buf: &mut Payload, ms: u32) {
    let bytes = encode_ms(ms);
    let _ = buf.extend_from_slice(&bytes);
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        use Command::*;
        match self {
            MenuTrigger { .. } => Opcode::MenuTrigger,
            MenuDelay { .. } => Opcode::MenuDelay,
            MenuInterval { .. } => Opcode::MenuInterval,
            MenuTimings { .. } => Opcode::MenuTimings,
            MenuInput { .. } => Opcode::MenuInput,
            MenuSettings { .. } => Opcode::MenuSettings,
            Focus => Opcode::Focus,
            FocusHold => Opcode::FocusHold,
            FocusRelease => Opcode::FocusRelease,
            Trigger => Opcode::Trigger,
            TriggerNoDelay => Opcode::TriggerNoDelay,
            TriggerHold => Opcode::TriggerHold,
            TriggerRelease => Opcode::TriggerRelease,
        }
    }

    /// Is this a settings-group opcode (as opposed to an action opcode)?
    /// Settings commands are gated per-parameter sync bit (§4.4.2); action
    /// commands are gated on `trigger_sync` alone (§4.4.3).
    pub fn is_settings_command(&self) -> bool {
        matches!(
            self,
            Command::MenuTrigger { .. }
                | Command::MenuDelay { .. }
                | Command::MenuInterval { .. }
                | Command::MenuTimings { .. }
                | Command::MenuInput { .. }
                | Command::MenuSettings { .. }
        )
    }

    /// Replace the trailing sync byte, used by the coordinator when
    /// bridging between transports (§4.4.2: append when forwarding
    /// radio->USB, strip when forwarding USB->radio).
    pub fn with_sync(&self, sync: Option<bool>) -> Command {
        let mut out = self.clone();
        match &mut out {
            Command::MenuTrigger { sync: s, .. }
            | Command::MenuDelay { sync: s, .. }
            | Command::MenuInterval { sync: s, .. }
            | Command::MenuTimings { sync: s, .. }
            | Command::MenuInput { sync: s, .. } => *s = sync,
            _ => {}
        }
        out
    }

    /// Serialize the payload bytes for this command (§3.3, §6). Always
    /// emits the long (sync-byte-included) form when `sync` is `Some`, and
    /// the coordinator is responsible for choosing `Some`/`None` per §4.4.2
    /// and §9's Open Questions ("always emit the 3-byte form toward USB").
    pub fn encode_payload(&self) -> Payload {
        let mut buf = Payload::new();
        match self {
            Command::MenuTrigger {
                focus_hold,
                trigger_hold,
                sync,
            } => {
                let _ = buf.push(*focus_hold as u8);
                let _ = buf.push(*trigger_hold as u8);
                if let Some(s) = sync {
                    let _ = buf.push(*s as u8);
                }
            }
            Command::MenuDelay { delay_ms, sync } => {
                push_u24(&mut buf, *delay_ms);
                if let Some(s) = sync {
                    let _ = buf.push(*s as u8);
                }
            }
            Command::MenuInterval {
                n_shots,
                delay_ms,
                sync,
            } => {
                let _ = buf.push(*n_shots);
                push_u24(&mut buf, *delay_ms);
                if let Some(s) = sync {
                    let _ = buf.push(*s as u8);
                }
            }
            Command::MenuTimings {
                focus_ms,
                trigger_ms,
                sync,
            } => {
                push_u24(&mut buf, *focus_ms);
                push_u24(&mut buf, *trigger_ms);
                if let Some(s) = sync {
                    let _ = buf.push(*s as u8);
                }
            }
            Command::MenuInput { mode, sync } => {
                let _ = buf.push(*mode as u8);
                if let Some(s) = sync {
                    let _ = buf.push(*s as u8);
                }
            }
            Command::MenuSettings { sync_channel } => {
                let _ = buf.push(*sync_channel);
            }
            Command::Focus
            | Command::FocusHold
            | Command::FocusRelease
            | Command::Trigger
            | Command::TriggerNoDelay
            | Command::TriggerHold
            | Command::TriggerRelease => {}
        }
        buf
    }

    /// Decode a payload against its opcode. Accepts both the short
    /// (no trailing sync byte) and long (with it) forms for settings
    /// opcodes per §9.
    pub fn decode(opcode: Opcode, payload: &[u8]) -> Result<Command, DecodeError> {
        use Opcode::*;
        Ok(match opcode {
            MenuTrigger => {
                want(opcode, payload.len(), 2)?;
                Command::MenuTrigger {
                    focus_hold: payload[0] != 0,
                    trigger_hold: payload[1] != 0,
                    sync: payload.get(2).map(|b| *b != 0),
                }
            }
            MenuDelay => {
                want(opcode, payload.len(), 3)?;
                Command::MenuDelay {
                    delay_ms: decode_ms([payload[0], payload[1], payload[2]]),
                    sync: payload.get(3).map(|b| *b != 0),
                }
            }
            MenuInterval => {
                want(opcode, payload.len(), 4)?;
                Command::MenuInterval {
                    n_shots: payload[0],
                    delay_ms: decode_ms([payload[1], payload[2], payload[3]]),
                    sync: payload.get(4).map(|b| *b != 0),
                }
            }
            MenuTimings => {
                want(opcode, payload.len(), 6)?;
                Command::MenuTimings {
                    focus_ms: decode_ms([payload[0], payload[1], payload[2]]),
                    trigger_ms: decode_ms([payload[3], payload[4], payload[5]]),
                    sync: payload.get(6).map(|b| *b != 0),
                }
            }
            MenuInput => {
                want(opcode, payload.len(), 1)?;
                Command::MenuInput {
                    mode: InputMode::from_wrapped(payload[0]),
                    sync: payload.get(1).map(|b| *b != 0),
                }
            }
            MenuSettings => {
                want(opcode, payload.len(), 1)?;
                Command::MenuSettings {
                    sync_channel: payload[0],
                }
            }
            Focus => Command::Focus,
            FocusHold => Command::FocusHold,
            FocusRelease => Command::FocusRelease,
            Trigger => Command::Trigger,
            TriggerNoDelay => Command::TriggerNoDelay,
            TriggerHold => Command::TriggerHold,
            TriggerRelease => Command::TriggerRelease,
            GetGuiState | GetGuiUpdate | Connect | Disconnect => return Err(DecodeError::NotACommandOpcode(opcode)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(cmd: Command) {
        let opcode = cmd.opcode();
        let payload = cmd.encode_payload();
        let decoded = Command::decode(opcode, &payload).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn action_opcodes_round_trip() {
        round_trip(Command::Focus);
        round_trip(Command::FocusHold);
        round_trip(Command::FocusRelease);
        round_trip(Command::Trigger);
        round_trip(Command::TriggerNoDelay);
        round_trip(Command::TriggerHold);
        round_trip(Command::TriggerRelease);
    }

    #[test]
    fn settings_opcodes_round_trip_with_and_without_sync() {
        round_trip(Command::MenuTrigger {
            focus_hold: true,
            trigger_hold: false,
            sync: None,
        });
        round_trip(Command::MenuTrigger {
            focus_hold: true,
            trigger_hold: false,
            sync: Some(true),
        });
        round_trip(Command::MenuDelay {
            delay_ms: 12_300,
            sync: Some(false),
        });
        round_trip(Command::MenuInterval {
            n_shots: 5,
            delay_ms: 2_000,
            sync: None,
        });
        round_trip(Command::MenuTimings {
            focus_ms: 400,
            trigger_ms: 200,
            sync: Some(true),
        });
        round_trip(Command::MenuInput {
            mode: InputMode::TriggerNoDelay,
            sync: None,
        });
        round_trip(Command::MenuSettings { sync_channel: 12 });
    }

    #[test]
    fn short_radio_form_and_long_usb_form_both_decode() {
        // Two revisions disagreed on whether MENU_TRIGGER carries 2 or 3
        // payload bytes (§9); both must decode.
        let short = Command::decode(Opcode::MenuTrigger, &[1, 0]).unwrap();
        let long = Command::decode(Opcode::MenuTrigger, &[1, 0, 1]).unwrap();
        assert_eq!(
            short,
            Command::MenuTrigger {
                focus_hold: true,
                trigger_hold: false,
                sync: None
            }
        );
        assert_eq!(
            long,
            Command::MenuTrigger {
                focus_hold: true,
                trigger_hold: false,
                sync: Some(true)
            }
        );
    }

    #[test]
    fn with_sync_strips_and_appends() {
        let cmd = Command::MenuDelay {
            delay_ms: 500,
            sync: Some(true),
        };
        assert_eq!(
            cmd.with_sync(None),
            Command::MenuDelay {
                delay_ms: 500,
                sync: None
            }
        );
        let action = Command::Trigger;
        assert_eq!(action.with_sync(Some(true)), action);
    }

    #[test]
    fn rejects_query_opcodes_as_commands() {
        assert_eq!(
            Command::decode(Opcode::GetGuiState, &[]),
            Err(DecodeError::NotACommandOpcode(Opcode::GetGuiState))
        );
    }

    #[test]
    fn rejects_connect_and_disconnect_as_commands() {
        assert_eq!(Command::decode(Opcode::Connect, &[]), Err(DecodeError::NotACommandOpcode(Opcode::Connect)));
        assert_eq!(Command::decode(Opcode::Disconnect, &[]), Err(DecodeError::NotACommandOpcode(Opcode::Disconnect)));
    }

    #[test]
    fn rejects_short_payload() {
        assert_eq!(
            Command::decode(Opcode::MenuDelay, &[1, 2]),
            Err(DecodeError::PayloadTooShort {
                opcode: Opcode::MenuDelay,
                got: 2,
                want: 3
            })
        );
    }
}

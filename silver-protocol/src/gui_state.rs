//! `GET_GUI_STATE` / `GET_GUI_UPDATE` USB query responses (§3.3, §6).

use heapless::Vec;

use crate::command::{Command, Payload};
use crate::opcode::Opcode;
use crate::settings::{InputMode, Settings};
use crate::time::{decode_ms, encode_ms};

/// Exact 22-byte layout of the `GET_GUI_STATE` response (§6):
/// `focus_hold, trigger_hold, trigger_sync, delay(3B), delay_sync,
/// n_shots, interval_delay(3B), interval_sync, input_mode, input_sync,
/// sync_channel, focus_dur(3B), trigger_dur(3B), settings_sync`.
pub const GUI_STATE_SIZE: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub struct GuiState {
    pub focus_hold: bool,
    pub trigger_hold: bool,
    pub settings: Settings,
}

impl GuiState {
    pub fn encode(&self) -> [u8; GUI_STATE_SIZE] {
        let s = &self.settings;
        let delay = encode_ms(s.delay_ms);
        let interval_delay = encode_ms(s.interval_delay_ms);
        let focus_dur = encode_ms(s.focus_duration_ms);
        let trigger_dur = encode_ms(s.trigger_duration_ms);
        [
            self.focus_hold as u8,
            self.trigger_hold as u8,
            s.trigger_sync as u8,
            delay[0],
            delay[1],
            delay[2],
            s.delay_sync as u8,
            s.interval_n_shots.min(u8::MAX as u16) as u8,
            interval_delay[0],
            interval_delay[1],
            interval_delay[2],
            s.interval_sync as u8,
            s.input_mode as u8,
            s.input_sync as u8,
            s.sync_channel,
            focus_dur[0],
            focus_dur[1],
            focus_dur[2],
            trigger_dur[0],
            trigger_dur[1],
            trigger_dur[2],
            s.settings_sync as u8,
        ]
    }

    pub fn decode(bytes: &[u8; GUI_STATE_SIZE]) -> Self {
        let mut base = Settings::default();
        base.trigger_sync = bytes[2] != 0;
        base.delay_ms = decode_ms([bytes[3], bytes[4], bytes[5]]);
        base.delay_sync = bytes[6] != 0;
        base.interval_n_shots = bytes[7] as u16;
        base.interval_delay_ms = decode_ms([bytes[8], bytes[9], bytes[10]]);
        base.interval_sync = bytes[11] != 0;
        base.input_mode = InputMode::from_wrapped(bytes[12]);
        base.input_sync = bytes[13] != 0;
        base.sync_channel = bytes[14];
        base.focus_duration_ms = decode_ms([bytes[15], bytes[16], bytes[17]]);
        base.trigger_duration_ms = decode_ms([bytes[18], bytes[19], bytes[20]]);
        base.settings_sync = bytes[21] != 0;
        GuiState {
            focus_hold: bytes[0] != 0,
            trigger_hold: bytes[1] != 0,
            settings: base,
        }
    }
}

/// Contents of the single-slot outbound buffer returned by
/// `GET_GUI_UPDATE` (§4.4.4, §4.6): empty if nothing is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct GuiUpdate(pub Option<(Opcode, Payload)>);

impl GuiUpdate {
    pub fn empty() -> Self {
        GuiUpdate(None)
    }

    pub fn from_command(cmd: &Command) -> Self {
        GuiUpdate(Some((cmd.opcode(), cmd.encode_payload())))
    }

    /// Wire form sent in reply to `GET_GUI_UPDATE`: opcode byte followed
    /// by payload, or zero bytes when empty.
    pub fn encode(&self) -> Vec<u8, { 1 + crate::command::MAX_PAYLOAD }> {
        let mut out = Vec::new();
        if let Some((opcode, payload)) = &self.0 {
            let _ = out.push((*opcode).into());
            let _ = out.extend_from_slice(payload);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gui_state_round_trips() {
        let state = GuiState {
            focus_hold: true,
            trigger_hold: false,
            settings: Settings {
                interval_n_shots: 12,
                ..Settings::default()
            },
        };
        let bytes = state.encode();
        assert_eq!(bytes.len(), GUI_STATE_SIZE);
        let decoded = GuiState::decode(&bytes);
        assert_eq!(decoded.focus_hold, state.focus_hold);
        assert_eq!(decoded.trigger_hold, state.trigger_hold);
        assert_eq!(decoded.settings.interval_n_shots, state.settings.interval_n_shots);
        assert_eq!(decoded.settings.trigger_sync, state.settings.trigger_sync);
    }

    #[test]
    fn empty_update_encodes_to_nothing() {
        assert!(GuiUpdate::empty().encode().is_empty());
    }

    #[test]
    fn update_carries_opcode_and_payload() {
        let update = GuiUpdate::from_command(&Command::Trigger);
        let bytes = update.encode();
        assert_eq!(bytes.as_slice(), &[Opcode::Trigger as u8]);
    }
}

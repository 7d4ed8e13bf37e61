//! The sync coordinator (§4.4): fans commands out across the three peers
//! (local UI, radio, USB) without ever looping a command back to the peer
//! it came from, and mirrors settings changes to USB unconditionally so a
//! connected host never drifts from the unit's actual configuration.
//!
//! Grounded on the fan-in/fan-out shape of `examples/original_source/sync.cpp`
//! and `sync_usb.cpp`, generalized from their two-peer (radio/USB) design to
//! the three-peer one named in §4.4.

use heapless::Vec;
use silver_protocol::{Command, InputMode, Settings};

use crate::sequencer::{ReflexCommand, SequencerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Local,
    Radio,
    Usb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Peer,
    pub command: Command,
}

fn to(peer: Peer, command: Command) -> Outbound {
    Outbound { to: peer, command }
}

pub type Outbounds = Vec<Outbound, 2>;

#[derive(Default)]
pub struct Coordinator;

impl Coordinator {
    pub fn new() -> Self {
        Self
    }

    /// Translate an inbound action command from a remote peer into the
    /// sequencer event it represents (§4.3.2). Local-origin events never
    /// pass through here: they come directly from button/input edges, and
    /// their outbound echo is a [`ReflexCommand`] handled by
    /// [`Self::route_reflex`].
    pub fn to_sequencer_event(settings: &Settings, command: &Command, origin: Peer) -> Option<SequencerEvent> {
        debug_assert_ne!(origin, Peer::Local);
        if origin == Peer::Radio && !settings.trigger_sync {
            return None;
        }
        let from_usb = origin == Peer::Usb;
        Some(match command {
            Command::Focus => SequencerEvent::RemoteFocus,
            Command::FocusHold => SequencerEvent::RemoteFocusHold { from_usb },
            Command::FocusRelease => SequencerEvent::RemoteFocusRelease,
            Command::Trigger => SequencerEvent::RemoteTrigger { skip_delay: false },
            Command::TriggerNoDelay => SequencerEvent::RemoteTrigger { skip_delay: true },
            Command::TriggerHold => SequencerEvent::RemoteTriggerHold { from_usb },
            Command::TriggerRelease => SequencerEvent::RemoteTriggerRelease,
            _ => return None,
        })
    }

    /// Fan an inbound action command out to the peers that did not send it
    /// (§4.4.3). Radio-bound forwarding is gated on `trigger_sync`
    /// regardless of which peer originated the command; USB is always
    /// informed when connected, since it is treated as a control/monitor
    /// link rather than a synced peer.
    pub fn route_action(&self, settings: &Settings, origin: Peer, command: Command, usb_connected: bool) -> Outbounds {
        let mut out = Outbounds::new();
        if origin != Peer::Usb && usb_connected {
            let _ = out.push(to(Peer::Usb, command.clone()));
        }
        if origin != Peer::Radio && settings.trigger_sync {
            let _ = out.push(to(Peer::Radio, command));
        }
        out
    }

    /// Route a sequencer-originated reflex (§4.3.5, §4.3.6): a button-edge
    /// echo or a spontaneous keepalive/timeout-release. `to_usb` on the
    /// reflex itself overrides the normal "always inform USB" rule, since a
    /// remote-hold timeout release must never echo back to the USB peer
    /// whose hold just expired.
    pub fn route_reflex(&self, settings: &Settings, reflex: &ReflexCommand, usb_connected: bool) -> Outbounds {
        let mut out = Outbounds::new();
        if reflex.to_usb && usb_connected {
            let _ = out.push(to(Peer::Usb, reflex.command.clone()));
        }
        if settings.trigger_sync {
            let _ = out.push(to(Peer::Radio, reflex.command.clone()));
        }
        out
    }

    /// Apply an inbound settings command to the persisted record and
    /// compute what must be mirrored out (§4.4.2):
    /// - A command from the radio is applied only if the field's own sync
    ///   bit is already set (rule 1); one from USB is always applied.
    /// - USB is always sent the long form (sync byte appended) so a
    ///   connected host's mirrored settings stay current even when the
    ///   change itself is not synced onto the radio.
    /// - Radio is sent the short form, but only when the field's own sync
    ///   bit is set — `MENU_SETTINGS` (the sync channel itself) is USB-only
    ///   and never forwarded to radio at all.
    pub fn apply_settings_command(
        &self,
        settings: &mut Settings,
        origin: Peer,
        command: Command,
        usb_connected: bool,
    ) -> Outbounds {
        let mut out = Outbounds::new();
        if origin == Peer::Radio && !synced_for_radio(settings, &command) {
            return out;
        }
        let sync_bit = mutate(settings, &command);
        settings.clamp();

        if origin != Peer::Usb && usb_connected {
            let _ = out.push(to(Peer::Usb, command.with_sync(sync_bit)));
        }
        if let Some(true) = sync_bit {
            if origin != Peer::Radio {
                let _ = out.push(to(Peer::Radio, command.with_sync(None)));
            }
        }
        out
    }
}

/// Whether a settings command arriving from the radio is allowed to touch
/// local state at all (§4.4.2 rule 1): gated on the sync bit the field
/// already carries, checked *before* the command's own mutation is
/// applied. `MENU_SETTINGS` has no sync bit and is USB-only, so a
/// radio-origin one is always rejected.
fn synced_for_radio(settings: &Settings, command: &Command) -> bool {
    match command {
        Command::MenuTrigger { .. } => settings.trigger_sync,
        Command::MenuDelay { .. } => settings.delay_sync,
        Command::MenuInterval { .. } => settings.interval_sync,
        Command::MenuTimings { .. } => settings.settings_sync,
        Command::MenuInput { .. } => settings.input_sync,
        Command::MenuSettings { .. } => false,
        _ => {
            debug_assert!(false, "synced_for_radio() called with a non-settings command");
            false
        }
    }
}

/// Apply the settings mutation carried by `command`, returning the
/// per-parameter sync bit that now governs it (§3.1), or `None` for
/// `MENU_SETTINGS`, which has no sync bit of its own.
fn mutate(settings: &mut Settings, command: &Command) -> Option<bool> {
    match *command {
        Command::MenuTrigger {
            focus_hold: _,
            trigger_hold: _,
            sync,
        } => {
            // The hold flags this opcode carries are momentary action state,
            // not persisted settings (§3.3) — only the trailing sync byte,
            // when present, updates the stored preference.
            if let Some(s) = sync {
                settings.trigger_sync = s;
            }
            Some(settings.trigger_sync)
        }
        Command::MenuDelay { delay_ms, sync } => {
            settings.delay_ms = delay_ms;
            if let Some(s) = sync {
                settings.delay_sync = s;
            }
            Some(settings.delay_sync)
        }
        Command::MenuInterval {
            n_shots,
            delay_ms,
            sync,
        } => {
            settings.interval_n_shots = n_shots as u16;
            settings.interval_delay_ms = delay_ms;
            if let Some(s) = sync {
                settings.interval_sync = s;
            }
            Some(settings.interval_sync)
        }
        Command::MenuTimings {
            focus_ms,
            trigger_ms,
            sync,
        } => {
            settings.focus_duration_ms = focus_ms;
            settings.trigger_duration_ms = trigger_ms;
            if let Some(s) = sync {
                settings.settings_sync = s;
            }
            Some(settings.settings_sync)
        }
        Command::MenuInput { mode, sync } => {
            settings.input_mode = mode;
            if let Some(s) = sync {
                settings.input_sync = s;
            }
            Some(settings.input_sync)
        }
        Command::MenuSettings { sync_channel } => {
            settings.sync_channel = sync_channel;
            None
        }
        _ => {
            debug_assert!(false, "mutate() called with a non-settings command");
            None
        }
    }
}

/// `MENU_INPUT +`/`-` from the UI glue wrap `InputMode` modulo its member
/// count rather than saturating (§9's Open Questions).
pub fn step_input_mode(current: InputMode, forward: bool) -> InputMode {
    if forward {
        current.next()
    } else {
        current.prev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_from_radio_reaches_usb_but_not_back_to_radio() {
        let coord = Coordinator::new();
        let settings = Settings::default();
        let out = coord.route_action(&settings, Peer::Radio, Command::Trigger, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Peer::Usb);
    }

    #[test]
    fn action_from_usb_reaches_radio_only_if_trigger_synced() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.trigger_sync = false;
        let out = coord.route_action(&settings, Peer::Usb, Command::Trigger, true);
        assert!(out.is_empty());

        settings.trigger_sync = true;
        let out = coord.route_action(&settings, Peer::Usb, Command::Trigger, true);
        assert_eq!(out, [to(Peer::Radio, Command::Trigger)]);
    }

    #[test]
    fn reflex_to_usb_false_never_reaches_usb_even_when_connected() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.trigger_sync = true;
        let reflex = ReflexCommand {
            command: Command::TriggerRelease,
            to_usb: false,
        };
        let out = coord.route_reflex(&settings, &reflex, true);
        assert_eq!(out, [to(Peer::Radio, Command::TriggerRelease)]);
    }

    #[test]
    fn settings_change_always_mirrors_to_usb_even_when_unsynced() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.delay_sync = false;
        let out = coord.apply_settings_command(
            &mut settings,
            Peer::Local,
            Command::MenuDelay {
                delay_ms: 500,
                sync: None,
            },
            true,
        );
        assert_eq!(settings.delay_ms, 500);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Peer::Usb);
        assert_eq!(
            out[0].command,
            Command::MenuDelay {
                delay_ms: 500,
                sync: Some(false)
            }
        );
    }

    #[test]
    fn settings_change_reaches_radio_only_when_synced() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.interval_sync = true;
        let out = coord.apply_settings_command(
            &mut settings,
            Peer::Usb,
            Command::MenuInterval {
                n_shots: 5,
                delay_ms: 1_000,
                sync: None,
            },
            false,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Peer::Radio);
        assert_eq!(out[0].command.opcode(), silver_protocol::Opcode::MenuInterval);
    }

    #[test]
    fn menu_settings_never_forwarded_to_radio() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        let out = coord.apply_settings_command(
            &mut settings,
            Peer::Usb,
            Command::MenuSettings { sync_channel: 9 },
            false,
        );
        assert_eq!(settings.sync_channel, 9);
        assert!(out.is_empty());
    }

    #[test]
    fn command_never_echoes_back_to_its_own_origin() {
        let coord = Coordinator::new();
        let settings = Settings::default();
        for origin in [Peer::Radio, Peer::Usb] {
            let out = coord.route_action(&settings, origin, Command::Focus, true);
            assert!(out.iter().all(|o| o.to != origin));
        }
    }

    #[test]
    fn unsynced_radio_settings_command_is_not_applied() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.delay_sync = false;
        settings.delay_ms = 100;
        let out = coord.apply_settings_command(
            &mut settings,
            Peer::Radio,
            Command::MenuDelay {
                delay_ms: 500,
                sync: None,
            },
            true,
        );
        assert_eq!(settings.delay_ms, 100, "unsynced radio command must not mutate settings");
        assert!(out.is_empty());
    }

    #[test]
    fn synced_radio_settings_command_is_applied_and_mirrored_to_usb() {
        let coord = Coordinator::new();
        let mut settings = Settings::default();
        settings.delay_sync = true;
        let out = coord.apply_settings_command(
            &mut settings,
            Peer::Radio,
            Command::MenuDelay {
                delay_ms: 500,
                sync: None,
            },
            true,
        );
        assert_eq!(settings.delay_ms, 500);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Peer::Usb);
    }

    #[test]
    fn unsynced_radio_action_does_not_become_a_sequencer_event() {
        let mut settings = Settings::default();
        settings.trigger_sync = false;
        assert_eq!(Coordinator::to_sequencer_event(&settings, &Command::Trigger, Peer::Radio), None);

        settings.trigger_sync = true;
        assert!(Coordinator::to_sequencer_event(&settings, &Command::Trigger, Peer::Radio).is_some());
    }

    #[test]
    fn usb_action_always_becomes_a_sequencer_event_regardless_of_trigger_sync() {
        let mut settings = Settings::default();
        settings.trigger_sync = false;
        assert!(Coordinator::to_sequencer_event(&settings, &Command::Trigger, Peer::Usb).is_some());
    }

    #[test]
    fn input_mode_step_wraps() {
        assert_eq!(step_input_mode(InputMode::Passthrough, true), InputMode::Disabled);
        assert_eq!(step_input_mode(InputMode::Disabled, false), InputMode::Passthrough);
    }
}

//! Button + menu glue (§4.7): turns GPIO edges into
//! [`silver_core::sequencer::SequencerEvent`]s and settings
//! [`Command`]s, and renders the current menu position through a
//! `Display` trait so swapping in a real OLED driver never touches this
//! module.
//!
//! Menu structure (six tabs, `gui.cpp`'s `MENU_LABELS`) and its submenu
//! items/digit-cursor editing are grounded on
//! `examples/original_source/gui.cpp`'s `handleButtons`,
//! `incrementTimeButton`/`decrementTimeButton` and
//! `incrementIntButton`/`decrementIntButton`, generalized to the five-button
//! mapping of §4.7: Left/Right rotate tabs with no submenu item selected,
//! otherwise cycle submenu items, or move the digit-cursor while editing;
//! Up/Down nudge the digit under the cursor (or flip a checkbox item).
//! Pixel rendering itself is out of scope (§1); `Display`'s bound mirrors
//! `embedded_graphics::draw_target::DrawTarget`, the shape used by
//! `examples/adamgreig-walkclock-public`, the pack's other
//! embedded-graphics UI firmware.

use silver_protocol::{Command, InputMode, Settings};

use silver_core::coordinator::step_input_mode;
use silver_core::sequencer::SequencerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuGroup {
    Trigger,
    Delay,
    Interval,
    Timings,
    Input,
    Settings,
}

pub const MENU_GROUPS: [MenuGroup; 6] = [
    MenuGroup::Trigger,
    MenuGroup::Delay,
    MenuGroup::Interval,
    MenuGroup::Timings,
    MenuGroup::Input,
    MenuGroup::Settings,
];

/// Submenu item count per tab, not counting the tab bar itself
/// (`item_index == 0`). Mirrors `gui.cpp`'s per-group `SUBMENU_*` item
/// counts: Trigger has just its sync checkbox here, since hold/focus
/// actions stay reachable from the tab bar the way they already were.
fn item_count(group: MenuGroup) -> usize {
    use MenuGroup::*;
    match group {
        Trigger => 1,
        Delay => 2,
        Interval => 3,
        Timings => 3,
        Input => 2,
        Settings => 2,
    }
}

/// What kind of value a submenu item edits, which decides how Up/Down
/// interpret the digit cursor.
enum FieldKind {
    /// A millisecond duration, stepped through [`MS_STEPS`] by cursor position.
    Ms,
    /// The interval shot count, stepped through [`COUNT_STEPS`] by cursor position.
    Count,
    /// A small scalar (sync channel, brightness) with no digit cursor.
    Single,
    /// `input_mode`, cycled one step per press with no digit cursor.
    InputModeStep,
    /// A checkbox: Up sets it, Down clears it.
    Bool,
}

fn field_kind(group: MenuGroup, item: usize) -> FieldKind {
    use MenuGroup::*;
    match (group, item) {
        (Trigger, 1) => FieldKind::Bool,
        (Delay, 1) => FieldKind::Ms,
        (Delay, 2) => FieldKind::Bool,
        (Interval, 1) => FieldKind::Count,
        (Interval, 2) => FieldKind::Ms,
        (Interval, 3) => FieldKind::Bool,
        (Timings, 1) => FieldKind::Ms,
        (Timings, 2) => FieldKind::Ms,
        (Timings, 3) => FieldKind::Bool,
        (Input, 1) => FieldKind::InputModeStep,
        (Input, 2) => FieldKind::Bool,
        (Settings, 1) => FieldKind::Single,
        (Settings, 2) => FieldKind::Single,
        _ => FieldKind::Bool,
    }
}

/// `gui.cpp`'s `incrementTimeButton`/`decrementTimeButton` step table, one
/// entry per digit-cursor position.
const MS_STEPS: [u32; 7] = [100, 1_000, 10_000, 60_000, 600_000, 3_600_000, 36_000_000];
/// `gui.cpp`'s `incrementIntButton`/`decrementIntButton` step table for the
/// 4-digit shot count.
const COUNT_STEPS: [i64; 4] = [1, 10, 100, 1_000];

fn cursor_count(kind: &FieldKind) -> usize {
    match kind {
        FieldKind::Ms => MS_STEPS.len(),
        FieldKind::Count => COUNT_STEPS.len(),
        FieldKind::Single | FieldKind::InputModeStep | FieldKind::Bool => 1,
    }
}

/// What the display needs to draw one frame: which tab is selected, which
/// submenu item within it (0 = tab bar itself), and whether the user is
/// mid-edit of that item's digit cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MenuSnapshot {
    pub group: MenuGroup,
    pub item_index: usize,
    pub editing: bool,
    pub edit_cursor: usize,
    pub settings: Settings,
}

/// A display capable of rendering one [`MenuSnapshot`]. Implemented by a
/// real OLED driver outside this crate's scope; kept intentionally
/// minimal (no pixel primitives) the way `embedded_graphics::DrawTarget`
/// keeps its `draw_iter` minimal and leaves shape composition to callers.
pub trait Display {
    type Error;

    fn clear(&mut self) -> Result<(), Self::Error>;
    fn draw_menu(&mut self, snapshot: &MenuSnapshot) -> Result<(), Self::Error>;
}

/// A display that draws nothing, for boards without the OLED attached.
pub struct NoDisplay;

impl Display for NoDisplay {
    type Error = core::convert::Infallible;

    fn clear(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn draw_menu(&mut self, _snapshot: &MenuSnapshot) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Physical buttons (§4.7, §5): Left/Right and Up/Down move through the
/// tab/submenu-item/digit-cursor hierarchy, Ok commits an edit or fires
/// the trigger from the tab bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Up,
    Down,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

pub struct Menu {
    group_index: usize,
    item_index: usize,
    editing: bool,
    edit_cursor: usize,
}

impl Default for Menu {
    fn default() -> Self {
        Self {
            group_index: 0,
            item_index: 0,
            editing: false,
            edit_cursor: 0,
        }
    }
}

/// A consequence of a button edge: a command to apply/forward, a sequencer
/// event for the trigger state machine, or nothing (pure menu navigation).
pub enum UiAction {
    Command(Command),
    Sequencer(SequencerEvent),
}

impl Menu {
    pub fn group(&self) -> MenuGroup {
        MENU_GROUPS[self.group_index]
    }

    pub fn snapshot(&self, settings: Settings) -> MenuSnapshot {
        MenuSnapshot {
            group: self.group(),
            item_index: self.item_index,
            editing: self.editing,
            edit_cursor: self.edit_cursor,
            settings,
        }
    }

    /// Apply one button edge (§4.7). `settings` is mutated in place for
    /// field edits; the returned action, if any, is what the caller must
    /// additionally feed to the coordinator/sequencer.
    pub fn on_edge(&mut self, settings: &mut Settings, button: Button, edge: ButtonEdge) -> Option<UiAction> {
        use Button::*;
        use ButtonEdge::*;

        match (button, edge) {
            (Left, Pressed) if self.item_index == 0 => {
                self.group_index = (self.group_index + MENU_GROUPS.len() - 1) % MENU_GROUPS.len();
                None
            }
            (Right, Pressed) if self.item_index == 0 => {
                self.group_index = (self.group_index + 1) % MENU_GROUPS.len();
                None
            }
            (Left, Pressed) if !self.editing => {
                self.item_index = prev_item(self.item_index, item_count(self.group()));
                None
            }
            (Right, Pressed) if !self.editing => {
                self.item_index = next_item(self.item_index, item_count(self.group()));
                None
            }
            (Left, Pressed) => {
                self.move_cursor(false);
                None
            }
            (Right, Pressed) => {
                self.move_cursor(true);
                None
            }
            (Up, Pressed) if self.editing => {
                self.adjust(settings, true);
                command_for_edit(settings, self.group(), self.item_index).map(UiAction::Command)
            }
            (Down, Pressed) if self.editing => {
                self.adjust(settings, false);
                command_for_edit(settings, self.group(), self.item_index).map(UiAction::Command)
            }
            (Ok, Pressed) => {
                if self.item_index == 0 && self.group() == MenuGroup::Trigger {
                    return Some(UiAction::Sequencer(SequencerEvent::LocalTriggerHoldStart));
                }
                if self.item_index == 0 {
                    self.item_index = 1;
                    return None;
                }
                self.editing = !self.editing;
                self.edit_cursor = 0;
                settings.clamp();
                None
            }
            (Ok, Released) => {
                if self.item_index == 0 && self.group() == MenuGroup::Trigger {
                    return Some(UiAction::Sequencer(SequencerEvent::LocalTriggerHoldEnd));
                }
                None
            }
            _ => None,
        }
    }

    fn move_cursor(&mut self, forward: bool) {
        let count = cursor_count(&field_kind(self.group(), self.item_index));
        if count <= 1 {
            return;
        }
        if forward {
            self.edit_cursor = (self.edit_cursor + 1).min(count - 1);
        } else {
            self.edit_cursor = self.edit_cursor.saturating_sub(1);
        }
    }

    fn adjust(&mut self, settings: &mut Settings, up: bool) {
        let group = self.group();
        let item = self.item_index;
        match field_kind(group, item) {
            FieldKind::Bool => set_bool_field(settings, group, item, up),
            FieldKind::Ms => {
                let step = MS_STEPS[self.edit_cursor.min(MS_STEPS.len() - 1)] as i64;
                step_ms_field(settings, group, item, if up { step } else { -step });
            }
            FieldKind::Count => {
                let step = COUNT_STEPS[self.edit_cursor.min(COUNT_STEPS.len() - 1)];
                let delta = if up { step } else { -step };
                settings.interval_n_shots = (settings.interval_n_shots as i64 + delta).clamp(1, 9999) as u16;
            }
            FieldKind::Single => step_single_field(settings, group, item, if up { 1 } else { -1 }),
            FieldKind::InputModeStep => settings.input_mode = step_input_mode(settings.input_mode, up),
        }
        settings.clamp();
    }

    /// Non-hold trigger press from outside the menu (e.g. a dedicated
    /// shutter button wired independently of the menu buttons).
    pub fn on_trigger_press(&self, skip_delay: bool) -> UiAction {
        UiAction::Sequencer(SequencerEvent::LocalTriggerPress { skip_delay })
    }

    /// External input pin edge, routed per `settings.input_mode` (§3.1).
    pub fn on_external_input(&self, mode: InputMode, asserted: bool) -> Option<UiAction> {
        use InputMode::*;
        Some(match (mode, asserted) {
            (Disabled, _) => return None,
            (Trigger, true) => UiAction::Sequencer(SequencerEvent::LocalTriggerPress { skip_delay: false }),
            (Trigger, false) => return None,
            (TriggerNoDelay, true) => UiAction::Sequencer(SequencerEvent::LocalTriggerPress { skip_delay: true }),
            (TriggerNoDelay, false) => return None,
            (Passthrough, true) => UiAction::Sequencer(SequencerEvent::LocalTriggerHoldStart),
            (Passthrough, false) => UiAction::Sequencer(SequencerEvent::LocalTriggerHoldEnd),
        })
    }
}

/// The settings command a just-edited field now represents, so the tick
/// that produced it can route it through the same
/// apply-then-fan-out path an incoming radio/USB command takes (§4.4.2):
/// persisted to flash, mirrored to USB, and mirrored to radio when the
/// field's own sync bit is set. `None` for fields with no wire
/// representation (brightness is display-local only, per §6's
/// `GET_GUI_STATE` layout).
fn command_for_edit(settings: &Settings, group: MenuGroup, item: usize) -> Option<Command> {
    use MenuGroup::*;
    Some(match (group, item) {
        (Trigger, 1) => Command::MenuTrigger {
            focus_hold: false,
            trigger_hold: false,
            sync: Some(settings.trigger_sync),
        },
        (Delay, 1) | (Delay, 2) => Command::MenuDelay {
            delay_ms: settings.delay_ms,
            sync: Some(settings.delay_sync),
        },
        (Interval, 1) | (Interval, 2) | (Interval, 3) => Command::MenuInterval {
            n_shots: settings.interval_n_shots.min(u8::MAX as u16) as u8,
            delay_ms: settings.interval_delay_ms,
            sync: Some(settings.interval_sync),
        },
        (Timings, 1) | (Timings, 2) | (Timings, 3) => Command::MenuTimings {
            focus_ms: settings.focus_duration_ms,
            trigger_ms: settings.trigger_duration_ms,
            sync: Some(settings.settings_sync),
        },
        (Input, 1) | (Input, 2) => Command::MenuInput {
            mode: settings.input_mode,
            sync: Some(settings.input_sync),
        },
        (Settings, 1) => Command::MenuSettings {
            sync_channel: settings.sync_channel,
        },
        _ => return None,
    })
}

fn prev_item(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    if current <= 1 {
        count
    } else {
        current - 1
    }
}

fn next_item(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    if current >= count {
        1
    } else {
        current + 1
    }
}

fn set_bool_field(settings: &mut Settings, group: MenuGroup, item: usize, value: bool) {
    use MenuGroup::*;
    match (group, item) {
        (Trigger, 1) => settings.trigger_sync = value,
        (Delay, 2) => settings.delay_sync = value,
        (Interval, 3) => settings.interval_sync = value,
        (Timings, 3) => settings.settings_sync = value,
        (Input, 2) => settings.input_sync = value,
        _ => {}
    }
}

fn step_ms_field(settings: &mut Settings, group: MenuGroup, item: usize, delta_ms: i64) {
    use MenuGroup::*;
    match (group, item) {
        (Delay, 1) => settings.delay_ms = step_ms(settings.delay_ms, delta_ms),
        (Interval, 2) => settings.interval_delay_ms = step_ms(settings.interval_delay_ms, delta_ms),
        (Timings, 1) => settings.focus_duration_ms = step_ms(settings.focus_duration_ms, delta_ms),
        (Timings, 2) => settings.trigger_duration_ms = step_ms(settings.trigger_duration_ms, delta_ms),
        _ => {}
    }
}

fn step_single_field(settings: &mut Settings, group: MenuGroup, item: usize, delta: i64) {
    use MenuGroup::*;
    match (group, item) {
        (Settings, 1) => settings.sync_channel = (settings.sync_channel as i64 + delta).clamp(0, 254) as u8,
        (Settings, 2) => settings.brightness = (settings.brightness as i64 + delta).clamp(0, 10) as u8,
        _ => {}
    }
}

fn step_ms(current: u32, delta_ms: i64) -> u32 {
    let stepped = current as i64 + delta_ms;
    stepped.clamp(0, silver_protocol::time::MAX_MS as i64) as u32
}

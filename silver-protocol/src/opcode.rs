/// One byte identifying what a [`crate::command::Command`] payload means.
///
/// Shared verbatim between the radio wire format and the USB `bRequest`
/// namespace (§3.3, §6). `BOOTLOADER` (`0x00` on USB only) is deliberately
/// not a variant here: it never carries a settings/action payload and is
/// handled by the USB transport before a frame reaches the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    MenuTrigger = 0x00,
    MenuDelay = 0x01,
    MenuInterval = 0x02,
    /// Called `MENU_ADVANCED` in some source revisions; same opcode (§9).
    MenuTimings = 0x03,
    MenuInput = 0x04,
    /// USB-only.
    MenuSettings = 0x05,
    /// USB IN only.
    GetGuiState = 0x80,
    /// USB IN only.
    GetGuiUpdate = 0x81,
    /// USB OUT only, zero-length (§4.6): gates the coordinator's
    /// "USB connected" signal on. Sent once by the host right after
    /// claiming the interface.
    Connect = 0x82,
    /// USB OUT only, zero-length (§4.6): the `Connect` counterpart, sent
    /// best-effort by the host as it disconnects.
    Disconnect = 0x83,
    Focus = 0x90,
    FocusHold = 0x91,
    FocusRelease = 0x92,
    Trigger = 0x93,
    TriggerNoDelay = 0x94,
    TriggerHold = 0x95,
    TriggerRelease = 0x96,
}

/// Opcode byte was not one of the values defined by §6's opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match byte {
            0x00 => MenuTrigger,
            0x01 => MenuDelay,
            0x02 => MenuInterval,
            0x03 => MenuTimings,
            0x04 => MenuInput,
            0x05 => MenuSettings,
            0x80 => GetGuiState,
            0x81 => GetGuiUpdate,
            0x82 => Connect,
            0x83 => Disconnect,
            0x90 => Focus,
            0x91 => FocusHold,
            0x92 => FocusRelease,
            0x93 => Trigger,
            0x94 => TriggerNoDelay,
            0x95 => TriggerHold,
            0x96 => TriggerRelease,
            other => return Err(UnknownOpcode(other)),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

/// USB-only control request that resets into the serial bootloader (§6).
/// Not part of [`Opcode`] since it never reaches the coordinator.
pub const BOOTLOADER_REQUEST: u8 = 0x00;

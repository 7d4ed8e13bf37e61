//! Wire format shared by the Silver trigger firmware, its radio peers, and
//! the host CLI: opcodes, command payloads, the persisted settings record,
//! and the USB query responses (§3, §6).
#![cfg_attr(not(feature = "std"), no_std)]

pub mod command;
pub mod frame;
pub mod gui_state;
pub mod opcode;
pub mod settings;
pub mod time;

pub use command::{Command, DecodeError};
pub use frame::{decode_frame, encode_frame, FrameError};
pub use gui_state::{GuiState, GuiUpdate, GUI_STATE_SIZE};
pub use opcode::{Opcode, UnknownOpcode, BOOTLOADER_REQUEST};
pub use settings::{InputMode, RadioMode, Settings};

/// Nominal nonzero timing constants from §6, reused by `silver-core`.
pub const REMOTE_HOLD_KEEPALIVE_MS: u64 = 500;
pub const REMOTE_HOLD_TIMEOUT_MS: u64 = 3_000;
pub const TICK_PERIOD_MS: u64 = 10;

/// Bumped whenever `GET_GUI_STATE`'s byte layout changes. Not carried on
/// the wire as its own opcode: a connected host reads it out of band (the
/// crate version) and only warns on a mismatch, since refusing to operate
/// a camera trigger over a version skew is worse than a stale field.
pub const PROTOCOL_VERSION: u8 = 1;

/// Silica's registered USB VID and Silver's product ID
/// (`examples/original_source/sync_usb.h`), shared by the firmware's
/// descriptor and the host's device match.
pub const USB_VENDOR_ID: u16 = 0x16c0;
pub const USB_PRODUCT_ID: u16 = 0xcbd0;

//! The hardware-independent heart of the Silver firmware: the trigger
//! sequencer (§4.3) and the sync coordinator that fans its commands out
//! across the local UI, the LoRa radio, and USB (§4.4). Kept `no_std` and
//! allocation-free so it can be exercised directly on a host, the same way
//! the wire format crate it builds on is.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod sequencer;
pub mod settings_store;
pub mod transport;

pub use clock::{elapsed_at_least, Clock, TestClock};
pub use coordinator::{Coordinator, Outbound, Peer};
pub use error::{ErrorCode, ErrorEvent, ErrorSink, Module, RingSink, Severity};
pub use sequencer::{Outputs, ReflexCommand, RuntimeState, Sequencer, SequencerEvent};
pub use settings_store::{Page, PageIo, SettingsStore};
pub use transport::{RadioTransport, UsbTransport};

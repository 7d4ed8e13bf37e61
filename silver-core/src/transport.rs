//! Transport-facing traits (§4.5, §4.6): `silver-core` only needs to poll
//! and push bytes, never to know about LoRa registers or USB descriptors,
//! so the firmware's real drivers and a test double can share one
//! `idle`-loop shape.

use silver_protocol::{Command, Opcode};

/// A half-duplex LoRa-style link carrying one decoded frame at a time.
pub trait RadioTransport {
    type Error;

    /// Non-blocking receive: `Ok(None)` when nothing is waiting.
    fn try_recv(&mut self) -> Result<Option<(Opcode, heapless::Vec<u8, 10>)>, Self::Error>;
    fn send(&mut self, command: &Command) -> Result<(), Self::Error>;
    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error>;
    fn set_receiving(&mut self, enabled: bool) -> Result<(), Self::Error>;
}

/// The USB control surface (§4.6): inbound commands arrive as decoded
/// opcode/payload pairs from the control endpoint; outbound commands are
/// queued for the next `GET_GUI_UPDATE` poll.
pub trait UsbTransport {
    type Error;

    fn connected(&self) -> bool;
    fn poll_inbound(&mut self) -> Result<Option<(Opcode, heapless::Vec<u8, 10>)>, Self::Error>;
    fn publish_outbound(&mut self, command: &Command) -> Result<(), Self::Error>;
}

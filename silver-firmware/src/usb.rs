//! Vendor-class USB control transport (§4.6).
//!
//! CDC-ACM (as `red-button-trigger-timestamp-firmware` uses via
//! `usbd-serial`) can't give us opcode-as-`bRequest` control transfers, so
//! this is a direct `usb-device` `UsbClass` impl instead, grounded on
//! `examples/original_source/sync_usb.cpp`'s `usbControlHandler`: OUT
//! requests carry the opcode in `bRequest` and the command payload in the
//! data stage; `GET_GUI_STATE`/`GET_GUI_UPDATE` are IN requests answered
//! from the latches `idle` fills in.

use heapless::Vec;
use usb_device::class_prelude::*;
use usb_device::control::RequestType;

use silver_core::transport::UsbTransport;
use silver_protocol::command::MAX_PAYLOAD;
use silver_protocol::gui_state::GUI_STATE_SIZE;
use silver_protocol::opcode::BOOTLOADER_REQUEST;
use silver_protocol::{Command, GuiState, GuiUpdate, Opcode, USB_PRODUCT_ID, USB_VENDOR_ID};

const CONNECT_REQUEST: u8 = Opcode::Connect as u8;
const DISCONNECT_REQUEST: u8 = Opcode::Disconnect as u8;

pub const VENDOR_ID: u16 = USB_VENDOR_ID;
pub const PRODUCT_ID: u16 = USB_PRODUCT_ID;

pub struct SilverUsbClass<'a, B: UsbBus> {
    iface: InterfaceNumber,
    _bus: core::marker::PhantomData<&'a B>,

    inbound: Option<(Opcode, Vec<u8, MAX_PAYLOAD>)>,
    gui_state: [u8; GUI_STATE_SIZE],
    outbound: GuiUpdate,
    bootloader_requested: bool,
    connected: bool,
}

impl<'a, B: UsbBus> SilverUsbClass<'a, B> {
    pub fn new(alloc: &UsbBusAllocator<B>) -> Self {
        Self {
            iface: alloc.interface(),
            _bus: core::marker::PhantomData,
            inbound: None,
            gui_state: [0; GUI_STATE_SIZE],
            outbound: GuiUpdate::empty(),
            bootloader_requested: false,
            connected: false,
        }
    }

    /// Called by `idle` before polling the control endpoint, so a
    /// `GET_GUI_STATE` IN transfer always answers with a fresh snapshot.
    pub fn set_gui_state(&mut self, state: &GuiState) {
        self.gui_state = state.encode();
    }

    pub fn take_bootloader_request(&mut self) -> bool {
        core::mem::take(&mut self.bootloader_requested)
    }
}

impl<'a, B: UsbBus> UsbClass<B> for SilverUsbClass<'a, B> {
    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        if req.request_type != RequestType::Vendor || req.recipient != usb_device::control::Recipient::Interface {
            return;
        }
        match Opcode::try_from(req.request) {
            Ok(Opcode::GetGuiState) => {
                let _ = xfer.accept_with(&self.gui_state);
            }
            Ok(Opcode::GetGuiUpdate) => {
                let bytes = self.outbound.encode();
                self.outbound = GuiUpdate::empty();
                let _ = xfer.accept_with(&bytes);
            }
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        if req.request_type != RequestType::Vendor || req.recipient != usb_device::control::Recipient::Interface {
            return;
        }
        if req.request == BOOTLOADER_REQUEST && req.length == 0 {
            // `BOOTLOADER_REQUEST` and `MENU_TRIGGER` share byte 0x00
            // (§6); a zero-length OUT data stage disambiguates the
            // bootloader reset request from a `MENU_TRIGGER` edit, which
            // always carries at least 2 payload bytes.
            self.bootloader_requested = true;
            let _ = xfer.accept();
            return;
        }
        if req.request == CONNECT_REQUEST {
            self.connected = true;
            let _ = xfer.accept();
            return;
        }
        if req.request == DISCONNECT_REQUEST {
            self.connected = false;
            let _ = xfer.accept();
            return;
        }
        let Ok(opcode) = Opcode::try_from(req.request) else {
            return;
        };
        let data = xfer.data();
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(&data[..data.len().min(MAX_PAYLOAD)]);
        self.inbound = Some((opcode, payload));
        let _ = xfer.accept();
    }
}

impl<'a, B: UsbBus> UsbTransport for SilverUsbClass<'a, B> {
    type Error = core::convert::Infallible;

    fn connected(&self) -> bool {
        // `usb-device` doesn't expose a host's presence to a `UsbClass`
        // directly; the host signals it explicitly with a `CONNECT`/
        // `DISCONNECT` control request around its session (§4.6).
        self.connected
    }

    fn poll_inbound(&mut self) -> Result<Option<(Opcode, Vec<u8, 10>)>, Self::Error> {
        Ok(self.inbound.take())
    }

    fn publish_outbound(&mut self, command: &Command) -> Result<(), Self::Error> {
        self.outbound = GuiUpdate::from_command(command);
        Ok(())
    }
}


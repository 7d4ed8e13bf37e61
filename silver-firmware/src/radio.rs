//! LoRa sub-GHz radio driver (§4.5).
//!
//! Kept at the register-setter abstraction level of
//! `examples/original_source/drivers/lora/lora.cpp` rather than a full
//! command-accurate chip driver: exact SPI/register layouts are out of
//! scope. Enum naming (`Sf`, `Bandwidth`, `CodingRate`) borrows from
//! `examples/TheClams-lr1120`'s `lora` module, the pack's other LoRa
//! driver.

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use silver_core::transport::RadioTransport;
use silver_protocol::{frame, Command, Opcode};

const REG_OP_MODE: u8 = 0x01;
const REG_FR_MSB: u8 = 0x06;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_FIFO_RX_BYTES_NB: u8 = 0x13;
const REG_PA_CONFIG: u8 = 0x09;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_FIFO: u8 = 0x00;

const IRQ_RX_DONE: u8 = 1 << 6;
const IRQ_TX_DONE: u8 = 1 << 3;

const REG_PA_CONFIG_OUTPUT_POWER: u8 = 0;
const REG_PA_CONFIG_PA_BOOST: u8 = 1 << 7;
const REG_MODEM_CONFIG_2_RX_PAYLOAD_CRC_ON: u8 = 1 << 2;

/// Crystal-referenced frequency step for the 32 MHz TCXO used on this
/// board; `freq_reg = round(freq_hz / FSTEP)` (same constant the original
/// driver derives its `setFrequency` register writes from).
const FSTEP_HZ: f64 = 32_000_000.0 / 524_288.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sf {
    Sf7 = 7,
    Sf8 = 8,
    Sf9 = 9,
    Sf10 = 10,
    Sf11 = 11,
    Sf12 = 12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Rate4_5 = 1,
    Rate4_6 = 2,
    Rate4_7 = 3,
    Rate4_8 = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Bw125kHz = 7,
    Bw250kHz = 8,
    Bw500kHz = 9,
}

#[derive(Debug, Clone, Copy)]
pub struct LoraConfig {
    pub frequency_hz: u32,
    pub sf: Sf,
    pub cr: CodingRate,
    pub bw: Bandwidth,
    /// PA_BOOST output power in dBm, 2..17 (§6).
    pub tx_power_dbm: i8,
    pub crc_on: bool,
}

/// §6's nominal on-air parameters: 868.25 MHz, SF8, CR 4/8, 125 kHz,
/// +14 dBm, CRC on.
impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 868_250_000,
            sf: Sf::Sf8,
            cr: CodingRate::Rate4_8,
            bw: Bandwidth::Bw125kHz,
            tx_power_dbm: 14,
            crc_on: true,
        }
    }
}

#[derive(Debug)]
pub enum RadioError {
    Spi,
    Pin,
}

pub struct Radio<SPI, CS, RESET> {
    spi: SPI,
    cs: CS,
    reset: RESET,
    channel: u8,
}

impl<SPI, CS, RESET, E> Radio<SPI, CS, RESET>
where
    SPI: Transfer<u8, Error = E> + Write<u8, Error = E>,
    CS: OutputPin,
    RESET: OutputPin,
{
    pub fn new(spi: SPI, cs: CS, reset: RESET) -> Self {
        Self {
            spi,
            cs,
            reset,
            channel: 0,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        self.cs.set_low().map_err(|_| RadioError::Pin)?;
        let result = self.spi.write(&[reg | 0x80, value]).map_err(|_| RadioError::Spi);
        self.cs.set_high().map_err(|_| RadioError::Pin)?;
        result
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, RadioError> {
        self.cs.set_low().map_err(|_| RadioError::Pin)?;
        let mut buf = [reg & 0x7F, 0x00];
        let result = self.spi.transfer(&mut buf).map_err(|_| RadioError::Spi);
        self.cs.set_high().map_err(|_| RadioError::Pin)?;
        result?;
        Ok(buf[1])
    }

    /// Bring the chip out of reset and apply §6's nominal radio parameters.
    pub fn init(&mut self, config: &LoraConfig) -> Result<(), RadioError> {
        self.reset.set_low().map_err(|_| RadioError::Pin)?;
        self.reset.set_high().map_err(|_| RadioError::Pin)?;

        self.set_frequency(config.frequency_hz)?;
        self.set_crc(config.crc_on)?;
        self.set_spreading_factor(config.sf)?;
        self.set_coding_rate(config.cr)?;
        self.set_bandwidth(config.bw)?;
        self.set_explicit_header(true)?;
        self.set_tx_power(config.tx_power_dbm)?;
        self.write_register(REG_FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, 0x00)?;
        Ok(())
    }

    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), RadioError> {
        let steps = (frequency_hz as f64 / FSTEP_HZ) as u32;
        let bytes = steps.to_be_bytes();
        self.write_register(REG_FR_MSB, bytes[1])?;
        self.write_register(REG_FR_MSB + 1, bytes[2])?;
        self.write_register(REG_FR_MSB + 2, bytes[3])?;
        Ok(())
    }

    pub fn set_spreading_factor(&mut self, sf: Sf) -> Result<(), RadioError> {
        let current = self.read_register(REG_MODEM_CONFIG_2)?;
        self.write_register(REG_MODEM_CONFIG_2, (current & 0x0F) | ((sf as u8) << 4))
    }

    pub fn set_coding_rate(&mut self, cr: CodingRate) -> Result<(), RadioError> {
        let current = self.read_register(REG_MODEM_CONFIG_1)?;
        self.write_register(REG_MODEM_CONFIG_1, (current & 0xF1) | ((cr as u8) << 1))
    }

    pub fn set_bandwidth(&mut self, bw: Bandwidth) -> Result<(), RadioError> {
        let current = self.read_register(REG_MODEM_CONFIG_1)?;
        self.write_register(REG_MODEM_CONFIG_1, (current & 0x0F) | ((bw as u8) << 4))
    }

    pub fn set_explicit_header(&mut self, enabled: bool) -> Result<(), RadioError> {
        let current = self.read_register(REG_MODEM_CONFIG_1)?;
        let value = if enabled { current & !1 } else { current | 1 };
        self.write_register(REG_MODEM_CONFIG_1, value)
    }

    pub fn set_crc(&mut self, enabled: bool) -> Result<(), RadioError> {
        let current = self.read_register(REG_MODEM_CONFIG_2)?;
        let value = if enabled {
            current | REG_MODEM_CONFIG_2_RX_PAYLOAD_CRC_ON
        } else {
            current & !REG_MODEM_CONFIG_2_RX_PAYLOAD_CRC_ON
        };
        self.write_register(REG_MODEM_CONFIG_2, value)
    }

    /// PA_BOOST output power (§6): this board ties the antenna to PA_BOOST
    /// rather than RFO, so the PA_BOOST bit is always set.
    pub fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        let output_power = (dbm - 2).clamp(0, 15) as u8;
        self.write_register(REG_PA_CONFIG, REG_PA_CONFIG_PA_BOOST | (output_power << REG_PA_CONFIG_OUTPUT_POWER))
    }

    pub fn enable_rx(&mut self) -> Result<(), RadioError> {
        self.write_register(REG_OP_MODE, 0b101)
    }

    pub fn disable_rx(&mut self) -> Result<(), RadioError> {
        self.write_register(REG_OP_MODE, 0b001)
    }

    pub fn tx(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        self.write_register(REG_FIFO_ADDR_PTR, 0x00)?;
        self.cs.set_low().map_err(|_| RadioError::Pin)?;
        let mut buf = Vec::<u8, { frame::MAX_FRAME_SIZE + 1 }>::new();
        let _ = buf.push(REG_FIFO | 0x80);
        let _ = buf.extend_from_slice(payload);
        let result = self.spi.write(&buf).map_err(|_| RadioError::Spi);
        self.cs.set_high().map_err(|_| RadioError::Pin)?;
        result?;
        self.write_register(REG_PAYLOAD_LENGTH, payload.len() as u8)?;
        self.write_register(REG_OP_MODE, 0b011)
    }

    fn rx_available(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_IRQ_FLAGS)? & IRQ_RX_DONE != 0)
    }

    fn read_received(&mut self) -> Result<Vec<u8, { frame::MAX_FRAME_SIZE }>, RadioError> {
        let len = self.read_register(REG_FIFO_RX_BYTES_NB)?;
        let addr = self.read_register(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, addr)?;

        let mut out = Vec::new();
        for _ in 0..len.min(frame::MAX_FRAME_SIZE as u8) {
            let byte = self.read_register(REG_FIFO)?;
            let _ = out.push(byte);
        }
        self.write_register(REG_IRQ_FLAGS, IRQ_RX_DONE | IRQ_TX_DONE)?;
        Ok(out)
    }
}

impl<SPI, CS, RESET, E> RadioTransport for Radio<SPI, CS, RESET>
where
    SPI: Transfer<u8, Error = E> + Write<u8, Error = E>,
    CS: OutputPin,
    RESET: OutputPin,
{
    type Error = RadioError;

    fn try_recv(&mut self) -> Result<Option<(Opcode, Vec<u8, 10>)>, Self::Error> {
        if !self.rx_available()? {
            return Ok(None);
        }
        let bytes = self.read_received()?;
        match frame::decode_frame(&bytes, self.channel) {
            Ok((opcode, payload)) => {
                let mut owned = Vec::new();
                let _ = owned.extend_from_slice(payload);
                Ok(Some((opcode, owned)))
            }
            // Not ours, malformed, or an unknown opcode — silently dropped
            // per §4.5/§7, not surfaced as a transport error.
            Err(_) => Ok(None),
        }
    }

    fn send(&mut self, command: &Command) -> Result<(), Self::Error> {
        let frame = frame::encode_frame(self.channel, command);
        self.tx(&frame)
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        self.channel = channel;
        Ok(())
    }

    fn set_receiving(&mut self, enabled: bool) -> Result<(), Self::Error> {
        if enabled {
            self.enable_rx()
        } else {
            self.disable_rx()
        }
    }
}

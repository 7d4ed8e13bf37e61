//! `PageIo` over the RP2040's own flash (§4.2, §6).
//!
//! `original_source/context.cpp`'s `Context::read`/`Context::save` persist
//! to the SAM4L's flash controller, which this board doesn't have; the
//! replacement here uses `rp2040-flash`'s boot-ROM wrappers, the crate the
//! wider embedded-Rust ecosystem reaches for on this chip (flash
//! program/erase must run with interrupts disabled and the XIP cache
//! invalidated, which the boot ROM handles).

use silver_core::settings_store::{Page, PageIo};
use silver_protocol::settings::PAGE_WORD_COUNT;

/// One 4 KiB sector near the top of the 2 MiB flash used by `rp-pico`,
/// reserved for settings and never touched by the XIP-mapped program
/// image.
pub const SETTINGS_OFFSET: u32 = 0x1F_F000;
/// Where flash is memory-mapped for reads on the RP2040 (datasheet §2.6).
const XIP_BASE: u32 = 0x1000_0000;
const SECTOR_SIZE: usize = 4096;
const PAGE_BYTES: usize = PAGE_WORD_COUNT * 4;

#[derive(Debug)]
pub struct FlashError;

pub struct FlashPage;

impl FlashPage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FlashPage {
    fn default() -> Self {
        Self::new()
    }
}

impl PageIo for FlashPage {
    type Error = FlashError;

    fn read_page(&mut self) -> Result<Page, Self::Error> {
        let flash_ptr = (XIP_BASE + SETTINGS_OFFSET) as *const u8;
        let mut bytes = [0u8; PAGE_BYTES];
        unsafe {
            core::ptr::copy_nonoverlapping(flash_ptr, bytes.as_mut_ptr(), PAGE_BYTES);
        }
        let mut page = [0u32; PAGE_WORD_COUNT];
        for (word, chunk) in page.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(page)
    }

    fn write_page(&mut self, page: &Page) -> Result<(), Self::Error> {
        let mut bytes = [0u8; SECTOR_SIZE];
        for (word, chunk) in page.iter().zip(bytes.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        for b in &mut bytes[PAGE_BYTES..] {
            *b = 0xFF;
        }

        // Erase-then-write a whole sector with interrupts disabled, per
        // `rp2040-flash`'s safety contract (flash cannot be read while
        // being programmed, and nothing else may run from flash
        // meanwhile).
        cortex_m::interrupt::free(|_| unsafe {
            rp2040_flash::flash::flash_range_erase_and_write(SETTINGS_OFFSET, &bytes, true);
        });
        Ok(())
    }
}

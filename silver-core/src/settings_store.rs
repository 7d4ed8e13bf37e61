//! NVM-backed settings persistence (§4.2, §7).
//!
//! `silver-core` stays free of any particular flash driver: the firmware
//! crate supplies a [`PageIo`] wrapping its HAL, and `SettingsStore` owns
//! only the retry/error-reporting policy layered on top of it.

use silver_protocol::settings::PAGE_WORD_COUNT;
use silver_protocol::Settings;

use crate::error::{ErrorCode, ErrorEvent, ErrorSink, Module, Severity};

pub type Page = [u32; PAGE_WORD_COUNT];

/// A single flash page's worth of 32-bit-word storage. Implemented by the
/// firmware crate over its HAL's flash driver; a plain in-memory array
/// suffices for tests.
pub trait PageIo {
    type Error;

    fn read_page(&mut self) -> Result<Page, Self::Error>;
    fn write_page(&mut self, page: &Page) -> Result<(), Self::Error>;
}

/// Settings load/save with the retry-once-then-warn policy of §4.2 and
/// §7's "degrade to defaults, record a Warning" rule.
pub struct SettingsStore<IO> {
    io: IO,
}

impl<IO: PageIo> SettingsStore<IO> {
    pub fn new(io: IO) -> Self {
        Self { io }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    /// Load settings at boot. A read failure is retried once; if both
    /// attempts fail, falls back to `Settings::default()` and reports
    /// accordingly (§4.2, §7). An unprogrammed page is not a failure: the
    /// in-memory defaults are written back immediately so the page reads
    /// as programmed on the next boot.
    pub fn load(&mut self, now_ms: u64, errors: &mut dyn ErrorSink) -> Settings {
        let page = match self.io.read_page().or_else(|_| self.io.read_page()) {
            Ok(page) => page,
            Err(_) => {
                errors.report(ErrorEvent {
                    module: Module::Nvm,
                    severity: Severity::Warning,
                    code: ErrorCode::NvmReadFailed,
                    at_ms: now_ms,
                });
                return Settings::default();
            }
        };
        match Settings::read_from_page(&page) {
            Some(settings) => settings,
            None => {
                let defaults = Settings::default();
                self.save(&defaults, now_ms, errors);
                defaults
            }
        }
    }

    /// Persist settings. A write failure is retried once; if both attempts
    /// fail the change is kept in RAM only and a Warning is reported — the
    /// unit keeps operating on the in-memory value (§4.2, §7).
    pub fn save(&mut self, settings: &Settings, now_ms: u64, errors: &mut dyn ErrorSink) {
        let mut page = match self.io.read_page() {
            Ok(page) => page,
            Err(_) => [0u32; PAGE_WORD_COUNT],
        };
        settings.write_into_page(&mut page);

        if self.io.write_page(&page).is_err() && self.io.write_page(&page).is_err() {
            errors.report(ErrorEvent {
                module: Module::Nvm,
                severity: Severity::Warning,
                code: ErrorCode::NvmWriteFailed,
                at_ms: now_ms,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RingSink;

    struct MemPage {
        page: Page,
        fail_reads: u32,
        fail_writes: u32,
    }

    impl MemPage {
        fn unprogrammed() -> Self {
            Self {
                page: [0xFFFF_FFFF; PAGE_WORD_COUNT],
                fail_reads: 0,
                fail_writes: 0,
            }
        }
    }

    impl PageIo for MemPage {
        type Error = ();

        fn read_page(&mut self) -> Result<Page, Self::Error> {
            if self.fail_reads > 0 {
                self.fail_reads -= 1;
                return Err(());
            }
            Ok(self.page)
        }

        fn write_page(&mut self, page: &Page) -> Result<(), Self::Error> {
            if self.fail_writes > 0 {
                self.fail_writes -= 1;
                return Err(());
            }
            self.page = *page;
            Ok(())
        }
    }

    #[test]
    fn unprogrammed_page_loads_defaults_without_reporting_an_error() {
        let mut store = SettingsStore::new(MemPage::unprogrammed());
        let mut sink: RingSink<4> = RingSink::new();
        let loaded = store.load(0, &mut sink);
        assert_eq!(loaded, Settings::default());
        assert_eq!(sink.events().count(), 0);
    }

    #[test]
    fn unprogrammed_page_saves_defaults_back_to_flash() {
        let mut store = SettingsStore::new(MemPage::unprogrammed());
        let mut sink: RingSink<4> = RingSink::new();
        store.load(0, &mut sink);
        let io = store.into_inner();
        assert_ne!(io.page, [0xFFFF_FFFF; PAGE_WORD_COUNT], "defaults must be written back on an unprogrammed page");
        assert_eq!(Settings::read_from_page(&io.page).unwrap(), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = SettingsStore::new(MemPage::unprogrammed());
        let mut sink: RingSink<4> = RingSink::new();
        let mut settings = Settings::default();
        settings.delay_ms = 500;
        store.save(&settings, 0, &mut sink);
        let loaded = store.load(0, &mut sink);
        assert_eq!(loaded, settings);
        assert_eq!(sink.events().count(), 0);
    }

    #[test]
    fn single_read_glitch_is_absorbed_by_the_retry() {
        let mut io = MemPage::unprogrammed();
        io.fail_reads = 1;
        let mut store = SettingsStore::new(io);
        let mut sink: RingSink<4> = RingSink::new();
        let loaded = store.load(0, &mut sink);
        assert_eq!(loaded, Settings::default());
        assert_eq!(sink.events().count(), 0);
    }

    #[test]
    fn persistent_read_failure_reports_and_falls_back() {
        let mut io = MemPage::unprogrammed();
        io.fail_reads = 5;
        let mut store = SettingsStore::new(io);
        let mut sink: RingSink<4> = RingSink::new();
        let loaded = store.load(42, &mut sink);
        assert_eq!(loaded, Settings::default());
        let last = sink.last().unwrap();
        assert_eq!(last.code, ErrorCode::NvmReadFailed);
        assert_eq!(last.at_ms, 42);
    }

    #[test]
    fn persistent_write_failure_reports_but_keeps_in_memory_value_usable() {
        let mut io = MemPage::unprogrammed();
        io.fail_writes = 5;
        let mut store = SettingsStore::new(io);
        let mut sink: RingSink<4> = RingSink::new();
        let mut settings = Settings::default();
        settings.delay_ms = 900;
        store.save(&settings, 7, &mut sink);
        let last = sink.last().unwrap();
        assert_eq!(last.code, ErrorCode::NvmWriteFailed);
        assert_eq!(last.at_ms, 7);
    }
}

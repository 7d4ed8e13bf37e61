//! Central error sink (§7): three severities, a 16-entry ring of the most
//! recent events, no exception-like unwind — failures surface at the call
//! site as `Result`s and are additionally reported here for diagnosis.

use heapless::Deque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub enum Severity {
    /// Swallowed — recorded but otherwise invisible.
    Info,
    /// Triple-blink the trigger LED and continue.
    Warning,
    /// Stop, blink rapidly forever.
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub enum Module {
    Nvm,
    Radio,
    Usb,
    Peripheral,
    PowerSense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub enum ErrorCode {
    NvmReadFailed,
    NvmWriteFailed,
    RadioInitNoResponse,
    OutboundSlotFullOnForward,
    PeripheralBringUpFault,
    PowerSenseArbitrationLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "print-defmt", derive(defmt::Format))]
pub struct ErrorEvent {
    pub module: Module,
    pub severity: Severity,
    pub code: ErrorCode,
    pub at_ms: u64,
}

/// Something that reacts to an error event: a ring buffer recording it,
/// an LED blinker, a host-side tracing subscriber, ...
pub trait ErrorSink {
    fn report(&mut self, event: ErrorEvent);
}

/// Default in-firmware sink: the last 16 events, oldest dropped first
/// (§7: "records the last 16 events ... for later inspection").
pub struct RingSink<const N: usize = 16> {
    events: Deque<ErrorEvent, N>,
}

impl<const N: usize> Default for RingSink<N> {
    fn default() -> Self {
        Self {
            events: Deque::new(),
        }
    }
}

impl<const N: usize> RingSink<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> impl Iterator<Item = &ErrorEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&ErrorEvent> {
        self.events.back()
    }
}

impl<const N: usize> ErrorSink for RingSink<N> {
    fn report(&mut self, event: ErrorEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_last_sixteen() {
        let mut sink: RingSink<16> = RingSink::new();
        for i in 0..20u64 {
            sink.report(ErrorEvent {
                module: Module::Nvm,
                severity: Severity::Warning,
                code: ErrorCode::NvmWriteFailed,
                at_ms: i,
            });
        }
        assert_eq!(sink.events().count(), 16);
        assert_eq!(sink.last().unwrap().at_ms, 19);
        assert_eq!(sink.events().next().unwrap().at_ms, 4);
    }
}

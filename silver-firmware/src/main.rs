#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;

mod flash;
mod radio;
mod ui;
mod usb;

#[rtic::app(device = rp_pico::hal::pac, peripherals = true, dispatchers = [I2C0_IRQ])]
mod app {
    use rp_pico::XOSC_CRYSTAL_FREQ;

    use embedded_hal::digital::v2::{InputPin, OutputPin};
    use rp2040_hal::{self as hal, clocks::init_clocks_and_plls, usb::UsbBus, watchdog::Watchdog, Sio};
    use rp2040_monotonic::Rp2040Monotonic;
    use rtic::Mutex;
    use usb_device::{class_prelude::*, prelude::*};

    use heapless::Vec;

    use silver_core::{
        Clock, Coordinator, ErrorEvent, ErrorSink, Module, Outbound, Peer, RadioTransport, RingSink,
        RuntimeState, Sequencer, SequencerEvent, Severity, SettingsStore, UsbTransport,
    };
    use silver_protocol::{Command, GuiState, RadioMode, Settings};

    use crate::flash::FlashPage;
    use crate::radio::{LoraConfig, Radio};
    use crate::ui::{Button, ButtonEdge, Menu, UiAction};
    use crate::usb::SilverUsbClass;

    #[monotonic(binds = TIMER_IRQ_0, default = true)]
    type Monotonic = Rp2040Monotonic;

    /// How long the trigger LED stays lit for a Warning-severity event (§7).
    const WARNING_LED_MS: u64 = 1_500;

    type ButtonPin<P> = hal::gpio::Pin<P, hal::gpio::FunctionSioInput, hal::gpio::PullUp>;
    type ExternalInputPin = ButtonPin<hal::gpio::bank0::Gpio15>;
    type LedPin = hal::gpio::Pin<hal::gpio::bank0::Gpio25, hal::gpio::FunctionSioOutput, hal::gpio::PullNone>;
    type RadioSpi = hal::spi::Spi<hal::spi::Enabled, rp_pico::pac::SPI0, 8>;
    type RadioCs = hal::gpio::Pin<hal::gpio::bank0::Gpio9, hal::gpio::FunctionSioOutput, hal::gpio::PullNone>;
    type RadioReset = hal::gpio::Pin<hal::gpio::bank0::Gpio10, hal::gpio::FunctionSioOutput, hal::gpio::PullNone>;
    type RadioDriver = Radio<RadioSpi, RadioCs, RadioReset>;

    /// Polled button state (§4.7, §5): five buttons, diffed against the
    /// previous tick the same way the teacher's `idle` diffs its single
    /// trigger pin.
    pub struct Buttons {
        left: ButtonPin<hal::gpio::bank0::Gpio16>,
        right: ButtonPin<hal::gpio::bank0::Gpio17>,
        ok: ButtonPin<hal::gpio::bank0::Gpio18>,
        up: ButtonPin<hal::gpio::bank0::Gpio19>,
        down: ButtonPin<hal::gpio::bank0::Gpio20>,
        prev_left: bool,
        prev_right: bool,
        prev_ok: bool,
        prev_up: bool,
        prev_down: bool,
    }

    /// Jack-port external input (§1, §3.1): another trigger, a sensor, a
    /// foot switch — read as an active-low edge exactly like a button, but
    /// routed through `input_mode` rather than menu navigation.
    pub struct ExternalInput {
        pin: ExternalInputPin,
        prev_asserted: bool,
    }

    struct RticClock;

    impl Clock for RticClock {
        fn now_ms(&self) -> u64 {
            monotonics::Monotonic::now().ticks() / 1000
        }
    }

    #[shared]
    struct Shared {
        settings: Settings,
        error_led: LedPin,
        usb_class: SilverUsbClass<'static, UsbBus>,
    }

    #[local]
    struct Local {
        buttons: Buttons,
        external_input: ExternalInput,
        usb_dev: UsbDevice<'static, UsbBus>,
        radio: RadioDriver,
        settings_store: SettingsStore<FlashPage>,
        sequencer: Sequencer,
        coordinator: Coordinator,
        runtime: RuntimeState,
        menu: Menu,
        errors: RingSink<16>,
    }

    #[init(local = [usb_bus: Option<UsbBusAllocator<UsbBus>> = None])]
    fn init(c: init::Context) -> (Shared, Local, init::Monotonics) {
        defmt::info!("Hello from {}.", env!["CARGO_PKG_NAME"]);
        let mut resets = c.device.RESETS;
        let mut watchdog = Watchdog::new(c.device.WATCHDOG);
        let clocks = init_clocks_and_plls(
            XOSC_CRYSTAL_FREQ,
            c.device.XOSC,
            c.device.CLOCKS,
            c.device.PLL_SYS,
            c.device.PLL_USB,
            &mut resets,
            &mut watchdog,
        )
        .ok()
        .unwrap();

        let usb_bus = c.local.usb_bus;
        usb_bus.replace(UsbBusAllocator::new(UsbBus::new(
            c.device.USBCTRL_REGS,
            c.device.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut resets,
        )));
        let usb_class = SilverUsbClass::new(usb_bus.as_ref().unwrap());
        let usb_dev = UsbDeviceBuilder::new(usb_bus.as_ref().unwrap(), UsbVidPid(crate::usb::VENDOR_ID, crate::usb::PRODUCT_ID))
            .manufacturer("Silica")
            .product("Silver")
            .serial_number("0")
            .device_class(0xFF)
            .build();

        let sio = Sio::new(c.device.SIO);
        let pins = rp_pico::Pins::new(c.device.IO_BANK0, c.device.PADS_BANK0, sio.gpio_bank0, &mut resets);

        let mut error_led: LedPin = pins.led.reconfigure();
        error_led.set_low().unwrap();

        let buttons = Buttons {
            left: pins.gpio16.reconfigure(),
            right: pins.gpio17.reconfigure(),
            ok: pins.gpio18.reconfigure(),
            up: pins.gpio19.reconfigure(),
            down: pins.gpio20.reconfigure(),
            prev_left: false,
            prev_right: false,
            prev_ok: false,
            prev_up: false,
            prev_down: false,
        };

        let external_input = ExternalInput {
            pin: pins.gpio15.reconfigure(),
            prev_asserted: false,
        };

        let radio_cs: RadioCs = pins.gpio9.reconfigure();
        let radio_reset: RadioReset = pins.gpio10.reconfigure();
        let spi: RadioSpi = hal::spi::Spi::new(
            c.device.SPI0,
            (pins.gpio11.reconfigure(), pins.gpio12.reconfigure(), pins.gpio13.reconfigure()),
        )
        .init(
            &mut resets,
            clocks.peripheral_clock.freq(),
            embedded_hal::spi::MODE_0,
            1_000_000u32.Hz(),
        );
        let mut radio = Radio::new(spi, radio_cs, radio_reset);

        let mut errors = RingSink::<16>::new();
        let mut settings_store = SettingsStore::new(FlashPage::new());
        let settings = settings_store.load(0, &mut errors);

        let _ = radio.init(&LoraConfig::default());
        radio.set_channel(settings.sync_channel);
        if settings.radio_mode != RadioMode::Disabled {
            let _ = radio.enable_rx();
        }

        let mono = Monotonic::new(c.device.TIMER);

        (
            Shared { settings, error_led, usb_class },
            Local {
                buttons,
                external_input,
                usb_dev,
                radio,
                settings_store,
                sequencer: Sequencer::new(),
                coordinator: Coordinator::new(),
                runtime: RuntimeState::default(),
                menu: Menu::default(),
                errors,
            },
            init::Monotonics(mono),
        )
    }

    fn edge(pressed: bool, prev: &mut bool) -> Option<ButtonEdge> {
        if pressed == *prev {
            return None;
        }
        *prev = pressed;
        Some(if pressed { ButtonEdge::Pressed } else { ButtonEdge::Released })
    }

    fn poll_button_edges(buttons: &mut Buttons) -> Vec<(Button, ButtonEdge), 6> {
        let mut edges = Vec::new();
        if let Some(e) = edge(buttons.left.is_low().unwrap_or(false), &mut buttons.prev_left) {
            let _ = edges.push((Button::Left, e));
        }
        if let Some(e) = edge(buttons.right.is_low().unwrap_or(false), &mut buttons.prev_right) {
            let _ = edges.push((Button::Right, e));
        }
        if let Some(e) = edge(buttons.up.is_low().unwrap_or(false), &mut buttons.prev_up) {
            let _ = edges.push((Button::Up, e));
        }
        if let Some(e) = edge(buttons.down.is_low().unwrap_or(false), &mut buttons.prev_down) {
            let _ = edges.push((Button::Down, e));
        }
        if let Some(e) = edge(buttons.ok.is_low().unwrap_or(false), &mut buttons.prev_ok) {
            let _ = edges.push((Button::Ok, e));
        }
        edges
    }

    /// Poll the external input pin for an assert/release edge (§4.7).
    fn poll_external_input(external_input: &mut ExternalInput) -> Option<bool> {
        let asserted = external_input.pin.is_low().unwrap_or(false);
        if asserted == external_input.prev_asserted {
            return None;
        }
        external_input.prev_asserted = asserted;
        Some(asserted)
    }

    /// Send one routed command to the peer it was addressed to (§4.4.3).
    /// A radio forwarding failure degrades to a reported Warning rather
    /// than blocking the tick; USB has nowhere to report a publish
    /// failure since its `Error` is `Infallible`. Radio-bound traffic is
    /// additionally gated on `radio_mode` here rather than by swapping the
    /// driver type (§4.4.5): `RxOnly` only needs TX suppressed, which a
    /// `Disabled`-transport swap can't express on its own.
    fn send_outbound(
        radio: &mut RadioDriver,
        usb_class: &mut SilverUsbClass<'static, UsbBus>,
        errors: &mut RingSink<16>,
        now: u64,
        radio_mode: RadioMode,
        out: Outbound,
    ) {
        match out.to {
            Peer::Radio => {
                if radio_mode != RadioMode::Enabled {
                    return;
                }
                if radio.send(&out.command).is_err() {
                    errors.report(ErrorEvent {
                        module: Module::Radio,
                        severity: Severity::Warning,
                        code: silver_core::ErrorCode::OutboundSlotFullOnForward,
                        at_ms: now,
                    });
                }
            }
            Peer::Usb => {
                let _ = usb_class.publish_outbound(&out.command);
            }
            Peer::Local => {}
        }
    }

    fn handle_inbound(
        radio: &mut RadioDriver,
        usb_class: &mut SilverUsbClass<'static, UsbBus>,
        settings_store: &mut SettingsStore<FlashPage>,
        coordinator: &mut Coordinator,
        errors: &mut RingSink<16>,
        settings: &mut Settings,
        origin: Peer,
        command: Command,
        now: u64,
        events: &mut Vec<SequencerEvent, 4>,
    ) {
        let usb_connected = usb_class.connected();
        let radio_mode = settings.radio_mode;
        if command.is_settings_command() {
            for out in coordinator.apply_settings_command(settings, origin, command, usb_connected) {
                send_outbound(radio, usb_class, errors, now, radio_mode, out);
            }
            radio.set_channel(settings.sync_channel);
            settings_store.save(settings, now, errors);
        } else {
            if let Some(event) = Coordinator::to_sequencer_event(settings, &command, origin) {
                let _ = events.push(event);
            }
            for out in coordinator.route_action(settings, origin, command, usb_connected) {
                send_outbound(radio, usb_class, errors, now, radio_mode, out);
            }
        }
    }

    #[idle(shared = [settings, error_led, usb_class], local = [
        buttons, external_input, radio, settings_store, sequencer, coordinator, runtime, menu, errors,
    ])]
    fn idle(mut c: idle::Context) -> ! {
        let clock = RticClock;
        let mut bootloader_requested = false;
        loop {
            let now = clock.now_ms();
            let mut events: Vec<SequencerEvent, 4> = Vec::new();

            c.shared.settings.lock(|settings| {
                c.shared.usb_class.lock(|usb_class| {
                    for (button, button_edge) in poll_button_edges(c.local.buttons) {
                        match c.local.menu.on_edge(settings, button, button_edge) {
                            Some(UiAction::Sequencer(event)) => {
                                let _ = events.push(event);
                            }
                            Some(UiAction::Command(command)) => {
                                handle_inbound(
                                    c.local.radio,
                                    usb_class,
                                    c.local.settings_store,
                                    c.local.coordinator,
                                    c.local.errors,
                                    settings,
                                    Peer::Local,
                                    command,
                                    now,
                                    &mut events,
                                );
                            }
                            None => {}
                        }
                    }
                    if let Some(asserted) = poll_external_input(c.local.external_input) {
                        if let Some(UiAction::Sequencer(event)) = c.local.menu.on_external_input(settings.input_mode, asserted) {
                            let _ = events.push(event);
                        }
                    }

                    // §4.4.5: `Disabled` suppresses RX too, so the receive
                    // path is skipped outright rather than just dropping
                    // what comes back from it.
                    if settings.radio_mode != RadioMode::Disabled {
                        if let Ok(Some((opcode, payload))) = c.local.radio.try_recv() {
                            if let Ok(command) = Command::decode(opcode, &payload) {
                                handle_inbound(
                                    c.local.radio,
                                    usb_class,
                                    c.local.settings_store,
                                    c.local.coordinator,
                                    c.local.errors,
                                    settings,
                                    Peer::Radio,
                                    command,
                                    now,
                                    &mut events,
                                );
                            }
                        }
                    }
                    if let Ok(Some((opcode, payload))) = usb_class.poll_inbound() {
                        if let Ok(command) = Command::decode(opcode, &payload) {
                            handle_inbound(
                                c.local.radio,
                                usb_class,
                                c.local.settings_store,
                                c.local.coordinator,
                                c.local.errors,
                                settings,
                                Peer::Usb,
                                command,
                                now,
                                &mut events,
                            );
                        }
                    }

                    let (_outputs, reflexes) = c.local.sequencer.tick(settings, c.local.runtime, now, &events);
                    let usb_connected = usb_class.connected();
                    for reflex in reflexes {
                        for out in c.local.coordinator.route_reflex(settings, &reflex, usb_connected) {
                            send_outbound(c.local.radio, usb_class, c.local.errors, now, settings.radio_mode, out);
                        }
                    }

                    let gui_state = GuiState {
                        focus_hold: c.local.runtime.local_focus_hold || c.local.runtime.remote_focus_hold,
                        trigger_hold: c.local.runtime.local_trigger_hold || c.local.runtime.remote_trigger_hold,
                        settings: *settings,
                    };
                    usb_class.set_gui_state(&gui_state);

                    bootloader_requested = usb_class.take_bootloader_request();
                });
            });

            if bootloader_requested {
                hal::rom_data::reset_to_usb_boot(0, 0);
            }

            // §7: Warning triple-blinks and clears; Critical stays lit as
            // long as it remains the most recent event, standing in for
            // "blink rapidly forever". A Warning is only ever lit for
            // `WARNING_LED_MS` after it fires, not for the rest of the
            // session.
            c.shared.error_led.lock(|led| {
                let lit = match c.local.errors.last() {
                    Some(event) if event.severity == Severity::Critical => true,
                    Some(event) if event.severity == Severity::Warning => now.saturating_sub(event.at_ms) < WARNING_LED_MS,
                    _ => false,
                };
                let _ = if lit { led.set_high() } else { led.set_low() };
            });
        }
    }

    #[task(binds = USBCTRL_IRQ, shared = [usb_class], local = [usb_dev])]
    fn on_usb(mut c: on_usb::Context) {
        let usb_dev = c.local.usb_dev;
        c.shared.usb_class.lock(|usb_class| {
            usb_dev.poll(&mut [usb_class]);
        });
    }
}

use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self as anyhow, WrapErr};
use rusb::{Direction, Recipient, RequestType};
use tracing_subscriber::{fmt, layer::SubscriberExt};

use silver_protocol::{Command, GuiState, Opcode, GUI_STATE_SIZE, PROTOCOL_VERSION, USB_PRODUCT_ID, USB_VENDOR_ID};

const CONTROL_TIMEOUT: Duration = Duration::from_millis(200);
const POLL_PERIOD: Duration = Duration::from_millis(50);

#[derive(Parser)]
struct Cli {
    /// One-shot action to send before monitoring, or omit to just monitor.
    #[command(subcommand)]
    action: Option<Action>,

    /// Directory trigger/focus events are logged to as CSV.
    #[arg(short, long, default_value = "~/SILVER_DATA")]
    output_dir: String,
}

#[derive(Subcommand)]
enum Action {
    Trigger,
    TriggerNoDelay,
    Focus,
}

impl Action {
    fn into_command(self) -> Command {
        match self {
            Action::Trigger => Command::Trigger,
            Action::TriggerNoDelay => Command::TriggerNoDelay,
            Action::Focus => Command::Focus,
        }
    }
}

#[derive(serde::Serialize)]
struct EventRow {
    timestamp_local: chrono::DateTime<chrono::Local>,
    opcode: u8,
}

fn open_device() -> anyhow::Result<rusb::DeviceHandle<rusb::Context>> {
    let context = rusb::Context::new().wrap_err("creating USB context")?;
    let handle = context
        .open_device_with_vid_pid(USB_VENDOR_ID, USB_PRODUCT_ID)
        .ok_or_else(|| anyhow::eyre!("no Silver trigger found (vid={:04x} pid={:04x})", USB_VENDOR_ID, USB_PRODUCT_ID))?;
    handle.claim_interface(0).wrap_err("claiming vendor interface")?;
    Ok(handle)
}

/// Send a zero-length vendor OUT request carrying only an opcode, used for
/// `CONNECT`/`DISCONNECT` (§4.6), which have no `Command` payload.
fn send_raw_request(handle: &rusb::DeviceHandle<rusb::Context>, opcode: Opcode) -> anyhow::Result<()> {
    let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface);
    handle
        .write_control(request_type, opcode.into(), 0, 0, &[], CONTROL_TIMEOUT)
        .wrap_err_with(|| format!("sending {:?}", opcode))?;
    Ok(())
}

fn send_command(handle: &rusb::DeviceHandle<rusb::Context>, command: &Command) -> anyhow::Result<()> {
    let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface);
    let payload = command.encode_payload();
    handle
        .write_control(request_type, command.opcode().into(), 0, 0, &payload, CONTROL_TIMEOUT)
        .wrap_err_with(|| format!("sending {:?}", command))?;
    Ok(())
}

fn read_gui_state(handle: &rusb::DeviceHandle<rusb::Context>) -> anyhow::Result<GuiState> {
    let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface);
    let mut buf = [0u8; GUI_STATE_SIZE];
    let got = handle
        .read_control(request_type, Opcode::GetGuiState.into(), 0, 0, &mut buf, CONTROL_TIMEOUT)
        .wrap_err("reading GET_GUI_STATE")?;
    if got != GUI_STATE_SIZE {
        // §3.3 (NEW): a layout mismatch is reported, not fatal — the unit
        // still triggers over USB even if a field can't be trusted.
        tracing::warn!("GET_GUI_STATE returned {got} bytes, expected {GUI_STATE_SIZE}; firmware protocol version may differ from this host's {PROTOCOL_VERSION}");
    }
    Ok(GuiState::decode(&buf))
}

/// Poll `GET_GUI_UPDATE` once; `Ok(None)` means nothing was pending.
fn poll_gui_update(handle: &rusb::DeviceHandle<rusb::Context>) -> anyhow::Result<Option<Command>> {
    let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface);
    let mut buf = [0u8; 1 + silver_protocol::command::MAX_PAYLOAD];
    let got = handle
        .read_control(request_type, Opcode::GetGuiUpdate.into(), 0, 0, &mut buf, CONTROL_TIMEOUT)
        .wrap_err("reading GET_GUI_UPDATE")?;
    if got == 0 {
        return Ok(None);
    }
    let opcode = Opcode::try_from(buf[0]).wrap_err("decoding GET_GUI_UPDATE opcode")?;
    let command = Command::decode(opcode, &buf[1..got]).wrap_err("decoding GET_GUI_UPDATE payload")?;
    Ok(Some(command))
}

fn is_trigger_like(command: &Command) -> bool {
    matches!(
        command,
        Command::Trigger | Command::TriggerNoDelay | Command::TriggerHold | Command::Focus | Command::FocusHold
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    color_eyre::install()?;
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let collector = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(tracing_subscriber::filter::EnvFilter::from_default_env());
    tracing::subscriber::set_global_default(collector)?;

    let opt = Cli::parse();
    let handle = open_device().wrap_err("opening Silver trigger over USB")?;
    send_raw_request(&handle, Opcode::Connect).wrap_err("sending CONNECT")?;

    let state = read_gui_state(&handle)?;
    tracing::info!(
        "Connected. brightness={} trigger_sync={} input_mode={:?} sync_channel={}",
        state.settings.brightness,
        state.settings.trigger_sync,
        state.settings.input_mode,
        state.settings.sync_channel,
    );

    if let Some(action) = opt.action {
        send_command(&handle, &action.into_command())?;
    }

    let local = chrono::Local::now();
    let filename = local.format("silver_events_%Y%m%d_%H%M%S.csv").to_string();
    let output_dir = std::path::PathBuf::from(shellexpand::full(&opt.output_dir)?.to_string());
    std::fs::create_dir_all(&output_dir).wrap_err_with(|| format!("ensuring existence of directory {}", output_dir.display()))?;
    let full_path = output_dir.join(filename);
    let fd = std::fs::File::create(&full_path).wrap_err_with(|| format!("creating file {}", full_path.display()))?;
    tracing::info!("Logging events to {}", full_path.display());
    let mut csv_wtr = csv::Writer::from_writer(fd);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = tokio::time::sleep(POLL_PERIOD) => {
                match poll_gui_update(&handle) {
                    Ok(Some(command)) if is_trigger_like(&command) => {
                        let row = EventRow {
                            timestamp_local: chrono::Local::now(),
                            opcode: command.opcode().into(),
                        };
                        tracing::info!("event: {:?}", command);
                        csv_wtr.serialize(&row)?;
                        csv_wtr.flush()?;
                    }
                    Ok(Some(_)) | Ok(None) => {}
                    Err(e) => tracing::error!("poll failed: {e:#}"),
                }
            }
        }
    }

    // Best-effort: the device may already be gone (unplugged, reset into
    // the bootloader), so a failure here is not fatal to shutdown.
    if let Err(e) = send_raw_request(&handle, Opcode::Disconnect) {
        tracing::warn!("sending DISCONNECT failed: {e:#}");
    }
    Ok(())
}

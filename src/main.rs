use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use telerover::config::Config;
use telerover::input::{CollectorHandle, CollectorSettings, ComboTracker, VelocityCommand};
use telerover::link::transport::SerialTransport;
use telerover::link::LinkManager;
use telerover::mode::{self, ModeController};
use telerover::server::telemetry::TelemetryPublisher;
use telerover::server::{self, AppState};
use telerover::transmitter;
use telerover::video::{CameraSource, FrameHub};
use telerover::Fault;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = Config::load(&config_path)?;

    let cancel = CancellationToken::new();
    let (fault_tx, mut fault_rx) = mpsc::channel::<Fault>(8);

    // Serial radio link; an unopenable port aborts startup
    let (reader, writer) = SerialTransport::open_pair(&config.serial.port, config.serial.baud)
        .wrap_err_with(|| format!("Failed to open serial port {}", config.serial.port))?;

    let (mode_controller, mode_rx) = ModeController::new(&config.modes);

    let link = LinkManager::new(
        Box::new(writer),
        mode_rx.clone(),
        config.protocol.clone(),
        config.tx.hb_timeout_sec,
    );
    link.spawn_rx(Box::new(reader), fault_tx.clone(), cancel.clone());

    // Gamepad; no device is startup-fatal
    let (command_tx, command_rx) = watch::channel(VelocityCommand::default());
    let (button_tx, button_rx) = mpsc::channel(256);
    let _collector = CollectorHandle::spawn(
        CollectorSettings {
            dead_zone: config.gamepad.dead_zone,
            invert_v: config.gamepad.invert_v,
            invert_w: config.gamepad.invert_w,
        },
        command_tx,
        button_tx,
        fault_tx.clone(),
        cancel.clone(),
    )
    .map_err(|e| eyre!("Failed to start gamepad collector: {e}"))?;

    let tracker = ComboTracker::new(
        config.modes.combo_hold_sec,
        config.modes.sleep_combo,
        config.modes.speed_combo,
    );
    tokio::spawn(mode::run_mode_task(
        mode_controller,
        tracker,
        button_rx,
        cancel.clone(),
    ));

    tokio::spawn(transmitter::run_transmitter(
        link.clone(),
        command_rx,
        mode_rx.clone(),
        config.tx.max_rate_hz,
        fault_tx.clone(),
        cancel.clone(),
    ));

    // Video pipeline; an unopenable camera aborts startup
    let hub = FrameHub::new();
    let source =
        CameraSource::open(&config.video).wrap_err("Failed to open capture device")?;
    hub.spawn_capture(Box::new(source), fault_tx.clone(), cancel.clone());

    // Telemetry publisher and WebSocket server
    let publisher = TelemetryPublisher::new(link.clone(), mode_rx, config.ws.publish_hz);
    tokio::spawn(publisher.clone().run(cancel.clone()));

    let addr = format!("{}:{}", config.ws.host, config.ws.port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind WebSocket server on {addr}"))?;
    let state = AppState {
        publisher,
        frames: hub.subscribe(),
    };
    let mut server_task = tokio::spawn(server::serve(listener, state));

    info!(
        "telerover up: serial {} @ {}, ws {}",
        config.serial.port, config.serial.baud, addr
    );

    // Supervise: any subsystem fault takes the whole process down
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
        Some(fault) = fault_rx.recv() => Err(eyre!("{fault}")),
        joined = &mut server_task => match joined {
            Ok(Ok(())) => Err(eyre!("WebSocket server exited unexpectedly")),
            Ok(Err(e)) => Err(eyre!("WebSocket server failed: {e}")),
            Err(e) => Err(eyre!("WebSocket server task panicked: {e}")),
        },
    };

    cancel.cancel();
    result
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(())
}

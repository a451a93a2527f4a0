//! Fixed-rate command transmitter.
//!
//! Runs independently of the input sampling rate: each tick samples the
//! latest velocity command (older samples are deliberately discarded),
//! applies the current mode scale and transmits if the link allows it.
//! A gated tick is the expected steady state during sleep or link loss,
//! not an error.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::input::VelocityCommand;
use crate::link::LinkManager;
use crate::mode::ModeState;
use crate::Fault;

/// Apply the mode scale to a command, keeping both components bounded.
pub fn scale_command(command: &VelocityCommand, scale: f32) -> (f32, f32) {
    (
        (command.v * scale).clamp(-1.0, 1.0),
        (command.w * scale).clamp(-1.0, 1.0),
    )
}

pub async fn run_transmitter(
    link: Arc<LinkManager>,
    commands: watch::Receiver<VelocityCommand>,
    mode: watch::Receiver<ModeState>,
    rate_hz: f64,
    fault_sender: mpsc::Sender<Fault>,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(0.1));
    let mut ticker = interval(period);
    let mut last_sent: Option<(f32, f32)> = None;

    info!("Transmitter started at {:.1} Hz", rate_hz);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !link.can_transmit() {
            // Sleeping or stale heartbeat: skip silently, resume on recovery
            continue;
        }

        let command = *commands.borrow();
        let scale = mode.borrow().scale;
        let (v, w) = scale_command(&command, scale);

        if let Err(e) = link.send(v, w) {
            // A mid-run write error on an open transport is fatal; masking it
            // risks feeding stale commands to physical hardware.
            error!("Transmit failed: {}", e);
            let _ = fault_sender.send(Fault::new("transmitter", e)).await;
            return;
        }

        if last_sent != Some((v, w)) {
            debug!("TX {:.3},{:.3}", v, w);
            last_sent = Some((v, w));
        }
    }

    info!("Transmitter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModeCfg, ProtocolCfg};
    use crate::link::transport::MockTransport;
    use crate::mode::ModeController;
    use chrono::Local;

    fn command(v: f32, w: f32) -> VelocityCommand {
        VelocityCommand {
            v,
            w,
            timestamp: Local::now(),
        }
    }

    #[test]
    fn scaling_is_applied_and_bounded() {
        assert_eq!(scale_command(&command(1.0, -1.0), 0.7), (0.7, -0.7));
        assert_eq!(scale_command(&command(0.5, 0.5), 0.0), (0.0, 0.0));
        assert_eq!(scale_command(&command(1.0, 1.0), 1.0), (1.0, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeping_writes_zero_bytes_despite_input() {
        let (writer, written) = MockTransport::writer_only();
        let (_controller, mode_rx) = ModeController::new(&ModeCfg {
            start_sleep: true,
            ..ModeCfg::default()
        });
        let link = LinkManager::new(
            Box::new(writer),
            mode_rx.clone(),
            ProtocolCfg::default(),
            15.0,
        );

        let (cmd_tx, cmd_rx) = watch::channel(command(0.8, 0.2));
        let (fault_tx, _fault_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_transmitter(
            link,
            cmd_rx,
            mode_rx,
            10.0,
            fault_tx,
            cancel.clone(),
        ));

        // Keep feeding input while asleep; several tick periods elapse
        for _ in 0..5 {
            cmd_tx.send(command(0.9, -0.4)).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        cancel.cancel();
        task.await.unwrap();

        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connected_awake_link_transmits_latest_command() {
        let (writer, written) = MockTransport::writer_only();
        let (_controller, mode_rx) = ModeController::new(&ModeCfg {
            start_sleep: false,
            speed_default_scale: 0.5,
            ..ModeCfg::default()
        });
        let link = LinkManager::new(
            Box::new(writer),
            mode_rx.clone(),
            ProtocolCfg::default(),
            15.0,
        );
        link.handle_line("READY");

        let (_cmd_tx, cmd_rx) = watch::channel(command(1.0, -0.5));
        let (fault_tx, _fault_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_transmitter(
            link.clone(),
            cmd_rx,
            mode_rx,
            10.0,
            fault_tx,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        task.await.unwrap();

        let bytes = written.lock().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        // Latest command scaled by 0.5, repeated once per tick
        assert!(text.starts_with("0.500,-0.250\r\n"), "got {text:?}");
        assert!(link.snapshot().tx_count >= 2);
    }
}

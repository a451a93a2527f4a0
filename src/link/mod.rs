//! Serial link management: heartbeat tracking, link quality and gated TX.
//!
//! Connectivity is purely a function of local heartbeat age; peer timeout
//! notices are surfaced in the log but never change the local computation,
//! so the link-quality model does not depend on peer cooperation.

pub mod transport;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ProtocolCfg;
use crate::mode::ModeState;
use crate::Fault;
use transport::LineTransport;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    TransportClosed,
}

/// Link quality derived from heartbeat age: 100 on a fresh heartbeat,
/// linearly decaying to 0 at the timeout.
pub fn link_quality(age_s: f64, timeout_s: f64) -> u8 {
    if timeout_s <= 0.0 {
        return 0;
    }
    let quality = 100.0 * (1.0 - age_s / timeout_s);
    quality.clamp(0.0, 100.0).round() as u8
}

pub fn is_connected(age_s: f64, timeout_s: f64) -> bool {
    age_s < timeout_s
}

/// Mutable link bookkeeping behind the manager's mutex.
#[derive(Debug, Default)]
struct LinkState {
    last_heartbeat: Option<Instant>,
    tx_count: u64,
    last_tx: Option<Instant>,
    /// Effective pair most recently written to the wire.
    last_sent: (f32, f32),
    /// TX instants within the rate window, oldest first.
    tx_window: VecDeque<Instant>,
}

/// Window over which the telemetry TX rate is averaged.
const TX_RATE_WINDOW: Duration = Duration::from_secs(3);

/// Consistent point-in-time view of the link, safe for concurrent readers.
#[derive(Clone, Copy, Debug)]
pub struct LinkSnapshot {
    pub connected: bool,
    pub link_quality: u8,
    /// Seconds since the last heartbeat, `None` before the first one.
    pub hb_age_s: Option<f64>,
    pub tx_rate_hz: f64,
    pub tx_count: u64,
    pub last_sent: (f32, f32),
}

pub struct LinkManager {
    writer: Mutex<Box<dyn LineTransport>>,
    state: Mutex<LinkState>,
    mode: watch::Receiver<ModeState>,
    protocol: ProtocolCfg,
    hb_timeout: f64,
}

impl LinkManager {
    pub fn new(
        writer: Box<dyn LineTransport>,
        mode: watch::Receiver<ModeState>,
        protocol: ProtocolCfg,
        hb_timeout_sec: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            writer: Mutex::new(writer),
            state: Mutex::new(LinkState::default()),
            mode,
            protocol,
            hb_timeout: hb_timeout_sec,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify one inbound line. Heartbeats refresh the freshness clock;
    /// peer timeout notices are logged only; anything else is ignored.
    pub(crate) fn handle_line(&self, line: &str) {
        if line == self.protocol.hb_msg {
            debug!("Heartbeat received");
            self.lock_state().last_heartbeat = Some(Instant::now());
        } else if line == self.protocol.timeout_msg {
            warn!("Peer reports control timeout");
        } else if line == self.protocol.timeout_clear_msg {
            info!("Peer reports control timeout cleared");
        } else {
            debug!("Ignoring unrecognized line: {:?}", line);
        }
    }

    /// Spawn the blocking RX line-reader task.
    ///
    /// A transport read error is fatal to the subsystem: it is reported on
    /// the fault channel and the task exits, never silently retried.
    pub fn spawn_rx(
        self: &Arc<Self>,
        mut reader: Box<dyn LineTransport>,
        fault_sender: mpsc::Sender<Fault>,
        cancel: CancellationToken,
    ) {
        let manager = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            info!("Serial RX task started");
            while !cancel.is_cancelled() {
                match reader.read_line() {
                    Ok(Some(line)) if line.is_empty() => continue,
                    Ok(Some(line)) => manager.handle_line(&line),
                    Ok(None) => continue,
                    Err(e) => {
                        error!("Serial RX failed: {}", e);
                        let _ = fault_sender.blocking_send(Fault::new("serial-rx", e));
                        return;
                    }
                }
            }
            info!("Serial RX task stopped");
        });
    }

    /// Whether a command may be written right now: the heartbeat must be
    /// fresh and the operator must not have paused control.
    pub fn can_transmit(&self) -> bool {
        if self.mode.borrow().sleeping {
            return false;
        }
        self.snapshot().connected
    }

    /// Serialize and write one effective velocity command.
    pub fn send(&self, v: f32, w: f32) -> Result<(), LinkError> {
        let line = format!("{v:.3},{w:.3}\r\n");

        {
            let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            writer.write_all(line.as_bytes())?;
        }

        let now = Instant::now();
        let mut state = self.lock_state();
        state.tx_count += 1;
        state.last_tx = Some(now);
        state.last_sent = (v, w);
        state.tx_window.push_back(now);
        while let Some(front) = state.tx_window.front() {
            if now.duration_since(*front) > TX_RATE_WINDOW {
                state.tx_window.pop_front();
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Whole-value snapshot; readers never observe partially-updated fields.
    pub fn snapshot(&self) -> LinkSnapshot {
        let now = Instant::now();
        let state = self.lock_state();

        let hb_age_s = state
            .last_heartbeat
            .map(|at| now.duration_since(at).as_secs_f64());
        let (connected, quality) = match hb_age_s {
            Some(age) => (
                is_connected(age, self.hb_timeout),
                link_quality(age, self.hb_timeout),
            ),
            // Pessimistic before the first heartbeat
            None => (false, 0),
        };

        let in_window = state
            .tx_window
            .iter()
            .filter(|at| now.duration_since(**at) <= TX_RATE_WINDOW)
            .count();
        let tx_rate_hz =
            (in_window as f64 / TX_RATE_WINDOW.as_secs_f64() * 100.0).round() / 100.0;

        LinkSnapshot {
            connected,
            link_quality: quality,
            hb_age_s,
            tx_rate_hz,
            tx_count: state.tx_count,
            last_sent: state.last_sent,
        }
    }
}

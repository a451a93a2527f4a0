//! Operating mode state machine.
//!
//! Sleep is orthogonal to speed selection: entering sleep preserves the
//! Speed+ sub-state so waking resumes at the previous speed, and a speed
//! toggle received while sleeping only updates the remembered sub-state.

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ModeCfg;
use crate::input::{ButtonEvent, ComboAction, ComboTracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Sleeping,
    Normal,
    Boosted,
}

/// Point-in-time mode snapshot published over a watch channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeState {
    pub sleeping: bool,
    /// Speed+ sub-state; remembered across sleep.
    pub speed_plus: bool,
    /// Effective velocity scale: 0.0 while sleeping.
    pub scale: f32,
}

impl ModeState {
    pub fn mode(&self) -> Mode {
        if self.sleeping {
            Mode::Sleeping
        } else if self.speed_plus {
            Mode::Boosted
        } else {
            Mode::Normal
        }
    }
}

/// Sole writer of the mode state.
pub struct ModeController {
    sleeping: bool,
    speed_plus: bool,
    default_scale: f32,
    plus_scale: f32,
    sender: watch::Sender<ModeState>,
}

impl ModeController {
    pub fn new(cfg: &ModeCfg) -> (Self, watch::Receiver<ModeState>) {
        let controller = Self {
            sleeping: cfg.start_sleep,
            speed_plus: false,
            default_scale: cfg.speed_default_scale,
            plus_scale: cfg.speed_plus_scale,
            sender: watch::channel(ModeState {
                sleeping: cfg.start_sleep,
                speed_plus: false,
                scale: if cfg.start_sleep {
                    0.0
                } else {
                    cfg.speed_default_scale
                },
            })
            .0,
        };
        let receiver = controller.sender.subscribe();
        (controller, receiver)
    }

    fn state(&self) -> ModeState {
        let scale = if self.sleeping {
            0.0
        } else if self.speed_plus {
            self.plus_scale
        } else {
            self.default_scale
        };
        ModeState {
            sleeping: self.sleeping,
            speed_plus: self.speed_plus,
            scale,
        }
    }

    /// Apply a fired combo and publish the resulting state.
    pub fn apply(&mut self, action: ComboAction) {
        match action {
            ComboAction::ToggleSleep => {
                self.sleeping = !self.sleeping;
            }
            ComboAction::ToggleSpeed => {
                // While sleeping this only updates the remembered sub-state
                self.speed_plus = !self.speed_plus;
            }
        }

        let state = self.state();
        info!("Mode changed: {:?} (scale {:.2})", state.mode(), state.scale);
        self.sender.send_replace(state);
    }

    pub fn current(&self) -> ModeState {
        self.state()
    }
}

/// Mode task: consumes button events, drives the combo tracker and applies
/// fired combos. The tracker is also polled on a short timer so a held combo
/// matures even when no further button events arrive.
pub async fn run_mode_task(
    mut controller: ModeController,
    mut tracker: ComboTracker,
    mut buttons: mpsc::Receiver<ButtonEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(Duration::from_millis(100));

    loop {
        let actions = tokio::select! {
            _ = cancel.cancelled() => break,
            event = buttons.recv() => match event {
                Some(event) => tracker.on_button(&event),
                None => break,
            },
            _ = ticker.tick() => tracker.poll(chrono::Local::now()),
        };

        for action in actions {
            debug!("Combo fired: {:?}", action);
            controller.apply(action);
        }
    }

    info!("Mode task stopped");
}

//! Gamepad event collection.
//!
//! Polls gilrs for raw gamepad events, shapes the two drive axes into a
//! bounded velocity command and forwards button presses for combo tracking.
//! The drive mapping follows the operator convention: left stick Y is the
//! linear component `v`, right stick X is the angular component `w`.

use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::normalize::shape_axis;
use crate::Fault;

/// Bounded velocity command produced from stick motion.
///
/// Both components stay within `[-1, 1]` after dead-zone and rescale
/// application; mode scaling happens later in the transmitter.
#[derive(Debug, Clone, Copy)]
pub struct VelocityCommand {
    pub v: f32,
    pub w: f32,
    pub timestamp: DateTime<Local>,
}

impl Default for VelocityCommand {
    fn default() -> Self {
        Self {
            v: 0.0,
            w: 0.0,
            timestamp: Local::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Buttons recognized for combo configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadButton {
    A,
    B,
    X,
    Y,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Guide,
}

#[derive(Clone, Debug)]
pub struct ButtonEvent {
    pub button: PadButton,
    pub state: ButtonState,
    pub timestamp: DateTime<Local>,
}

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub dead_zone: f32,
    pub invert_v: bool,
    pub invert_w: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            dead_zone: 0.05,
            invert_v: false,
            invert_w: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize gamepad interface: {0}")]
    InitializationError(String),

    #[error("No gamepad connected")]
    NoGamepad,

    #[error("Failed to send event: {0}")]
    EventSendError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    // Latest-wins command output
    command_sender: watch::Sender<VelocityCommand>,

    // Button presses for the mode task's combo tracker
    button_sender: mpsc::Sender<ButtonEvent>,

    // Last shaped axis values, so one axis change re-emits the full pair
    last_v: f32,
    last_w: f32,
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: CollectorSettings,
        command_sender: watch::Sender<VelocityCommand>,
        button_sender: mpsc::Sender<ButtonEvent>,
    ) -> Result<Self, CollectorError> {
        debug!("Creating event collector with settings: {:?}", settings);

        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            command_sender,
            button_sender,
            0.0, // last_v
            0.0, // last_w
        ))
    }

    /// Select a gamepad and transition to the collecting state.
    ///
    /// No usable gamepad is a startup-fatal condition; the bridge must not
    /// run without an input device.
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            error!("No gamepad connected");
            return Err(CollectorError::NoGamepad);
        }

        info!("Found {} gamepad(s):", gamepads.len());
        for (id, gamepad) in &gamepads {
            info!("  ID: {}, Name: {}", id, gamepad.name());
        }

        let (id, gamepad) = &gamepads[0];
        self.active_gamepad = Some(*id);
        info!("Selected gamepad: {} ({})", gamepad.name(), id);

        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    /// Drain and handle the next pending gilrs event, if any.
    fn collect_next_event(&mut self) -> Result<(), CollectorError> {
        if let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    return Ok(());
                }
            }

            self.handle_event(event)?;
        }

        Ok(())
    }

    fn handle_event(&mut self, event: EventType) -> Result<(), CollectorError> {
        let now = Local::now();

        match event {
            EventType::AxisChanged(axis, value, _) => match axis {
                Axis::LeftStickY => {
                    self.last_v =
                        shape_axis(value, self.settings.dead_zone, self.settings.invert_v);
                    self.emit_command(now)
                }
                Axis::RightStickX => {
                    self.last_w =
                        shape_axis(value, self.settings.dead_zone, self.settings.invert_w);
                    self.emit_command(now)
                }
                _ => {
                    debug!("Ignoring unmapped axis: {:?}", axis);
                    Ok(())
                }
            },
            EventType::ButtonPressed(button, _) => {
                self.emit_button(button, ButtonState::Pressed, now)
            }
            EventType::ButtonReleased(button, _) => {
                self.emit_button(button, ButtonState::Released, now)
            }
            EventType::Disconnected => {
                // Surfaced to the run loop as fatal; a dead input device must
                // not leave the robot driving on the last command.
                error!("Active gamepad disconnected");
                Err(CollectorError::NoGamepad)
            }
            _ => Ok(()),
        }
    }

    fn emit_command(&mut self, timestamp: DateTime<Local>) -> Result<(), CollectorError> {
        let command = VelocityCommand {
            v: self.last_v,
            w: self.last_w,
            timestamp,
        };

        self.command_sender
            .send(command)
            .map_err(|e| CollectorError::EventSendError(e.to_string()))
    }

    fn emit_button(
        &mut self,
        button: Button,
        state: ButtonState,
        timestamp: DateTime<Local>,
    ) -> Result<(), CollectorError> {
        let Some(button) = map_button(button) else {
            debug!("Ignoring unmapped button: {:?}", button);
            return Ok(());
        };

        info!(
            "Button {:?} {:?} at {}",
            button,
            state,
            timestamp.format("%H:%M:%S%.3f")
        );

        self.button_sender
            .try_send(ButtonEvent {
                button,
                state,
                timestamp,
            })
            .map_err(|e| CollectorError::EventSendError(e.to_string()))
    }

    /// Poll gilrs until cancellation or a fatal collection error.
    pub fn run_collection_loop(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), CollectorError> {
        info!(
            "Starting gamepad collection loop (dead zone {})",
            self.settings.dead_zone
        );

        while !cancel.is_cancelled() {
            self.collect_next_event()?;

            // gilrs polling is non-blocking; yield briefly between polls
            std::thread::sleep(std::time::Duration::from_micros(500));
        }

        info!("Gamepad collection loop stopped");
        Ok(())
    }
}

/// Handle for the spawned gamepad collection task.
pub struct CollectorHandle {}

impl CollectorHandle {
    /// Initialize the collector synchronously (so missing-gamepad errors are
    /// startup-fatal) and spawn its blocking poll loop.
    pub fn spawn(
        settings: CollectorSettings,
        command_sender: watch::Sender<VelocityCommand>,
        button_sender: mpsc::Sender<ButtonEvent>,
        fault_sender: mpsc::Sender<Fault>,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        let collector = EventCollector::create(settings, command_sender, button_sender)?;
        let mut collector = collector.initialize()?;

        tokio::task::spawn_blocking(move || {
            if let Err(e) = collector.run_collection_loop(&cancel) {
                error!("Gamepad collector terminated: {}", e);
                let _ = fault_sender.blocking_send(Fault::new("gamepad", e));
            }
        });

        info!("Gamepad collector started");
        Ok(Self {})
    }
}

fn map_button(button: Button) -> Option<PadButton> {
    match button {
        Button::South => Some(PadButton::A),
        Button::East => Some(PadButton::B),
        Button::West => Some(PadButton::Y),
        Button::North => Some(PadButton::X),
        Button::Start => Some(PadButton::Start),
        Button::Select => Some(PadButton::Select),
        Button::LeftTrigger => Some(PadButton::LeftBumper),
        Button::RightTrigger => Some(PadButton::RightBumper),
        Button::LeftThumb => Some(PadButton::LeftStick),
        Button::RightThumb => Some(PadButton::RightStick),
        Button::DPadUp => Some(PadButton::DPadUp),
        Button::DPadDown => Some(PadButton::DPadDown),
        Button::DPadLeft => Some(PadButton::DPadLeft),
        Button::DPadRight => Some(PadButton::DPadRight),
        Button::Mode => Some(PadButton::Guide),
        _ => None,
    }
}

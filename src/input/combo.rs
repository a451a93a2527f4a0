//! Two-button combo hold detection.
//!
//! A combo is armed while both of its buttons are held and fires exactly once
//! when the hold reaches the configured duration. Releasing either button
//! before that disarms the combo with no effect. Because a hold can mature
//! without any intervening input event, the tracker is polled on a timer as
//! well as on each button event.

use chrono::{DateTime, Duration, Local};
use std::collections::HashSet;
use tracing::debug;

use super::collector::{ButtonEvent, ButtonState, PadButton};

/// Discrete mode-change request produced by a matured combo hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComboAction {
    ToggleSleep,
    ToggleSpeed,
}

#[derive(Debug)]
struct ComboSlot {
    buttons: [PadButton; 2],
    action: ComboAction,
    held_since: Option<DateTime<Local>>,
    fired: bool,
}

#[derive(Debug)]
pub struct ComboTracker {
    hold: Duration,
    slots: Vec<ComboSlot>,
    pressed: HashSet<PadButton>,
}

impl ComboTracker {
    pub fn new(
        hold_sec: f64,
        sleep_combo: [PadButton; 2],
        speed_combo: [PadButton; 2],
    ) -> Self {
        let hold = Duration::milliseconds((hold_sec * 1000.0) as i64);
        Self {
            hold,
            slots: vec![
                ComboSlot {
                    buttons: sleep_combo,
                    action: ComboAction::ToggleSleep,
                    held_since: None,
                    fired: false,
                },
                ComboSlot {
                    buttons: speed_combo,
                    action: ComboAction::ToggleSpeed,
                    held_since: None,
                    fired: false,
                },
            ],
            pressed: HashSet::new(),
        }
    }

    /// Feed a button transition, then evaluate holds at the event timestamp.
    pub fn on_button(&mut self, event: &ButtonEvent) -> Vec<ComboAction> {
        match event.state {
            ButtonState::Pressed => {
                self.pressed.insert(event.button);
            }
            ButtonState::Released => {
                self.pressed.remove(&event.button);
            }
        }

        for slot in &mut self.slots {
            let armed = slot.buttons.iter().all(|b| self.pressed.contains(b));
            match (armed, slot.held_since) {
                (true, None) => {
                    debug!("Combo {:?} armed", slot.action);
                    slot.held_since = Some(event.timestamp);
                    slot.fired = false;
                }
                (false, Some(_)) => {
                    debug!("Combo {:?} disarmed", slot.action);
                    slot.held_since = None;
                    slot.fired = false;
                }
                _ => {}
            }
        }

        self.poll(event.timestamp)
    }

    /// Fire any armed combo whose continuous hold has reached the threshold.
    pub fn poll(&mut self, now: DateTime<Local>) -> Vec<ComboAction> {
        let mut actions = Vec::new();

        for slot in &mut self.slots {
            if slot.fired {
                continue;
            }
            if let Some(since) = slot.held_since {
                if now - since >= self.hold {
                    slot.fired = true;
                    actions.push(slot.action);
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ComboTracker {
        ComboTracker::new(
            3.0,
            [PadButton::Select, PadButton::Start],
            [PadButton::LeftBumper, PadButton::RightBumper],
        )
    }

    fn event(button: PadButton, state: ButtonState, t: DateTime<Local>) -> ButtonEvent {
        ButtonEvent {
            button,
            state,
            timestamp: t,
        }
    }

    #[test]
    fn fires_once_when_hold_reaches_threshold() {
        let mut tr = tracker();
        let t0 = Local::now();

        assert!(tr
            .on_button(&event(PadButton::Select, ButtonState::Pressed, t0))
            .is_empty());
        assert!(tr
            .on_button(&event(PadButton::Start, ButtonState::Pressed, t0))
            .is_empty());

        // Below the threshold: nothing fires
        assert!(tr.poll(t0 + Duration::milliseconds(2999)).is_empty());

        // At the threshold: exactly one action
        let fired = tr.poll(t0 + Duration::seconds(3));
        assert_eq!(fired, vec![ComboAction::ToggleSleep]);

        // Continued hold does not re-fire
        assert!(tr.poll(t0 + Duration::seconds(10)).is_empty());
    }

    #[test]
    fn release_before_threshold_disarms_without_effect() {
        let mut tr = tracker();
        let t0 = Local::now();

        tr.on_button(&event(PadButton::Select, ButtonState::Pressed, t0));
        tr.on_button(&event(PadButton::Start, ButtonState::Pressed, t0));
        tr.on_button(&event(
            PadButton::Start,
            ButtonState::Released,
            t0 + Duration::seconds(1),
        ));

        assert!(tr.poll(t0 + Duration::seconds(5)).is_empty());
    }

    #[test]
    fn rearm_after_release_fires_again() {
        let mut tr = tracker();
        let t0 = Local::now();

        tr.on_button(&event(PadButton::Select, ButtonState::Pressed, t0));
        tr.on_button(&event(PadButton::Start, ButtonState::Pressed, t0));
        assert_eq!(
            tr.poll(t0 + Duration::seconds(4)),
            vec![ComboAction::ToggleSleep]
        );

        tr.on_button(&event(
            PadButton::Start,
            ButtonState::Released,
            t0 + Duration::seconds(5),
        ));
        tr.on_button(&event(
            PadButton::Start,
            ButtonState::Pressed,
            t0 + Duration::seconds(6),
        ));

        // Fresh hold starts counting from the re-press
        assert!(tr.poll(t0 + Duration::seconds(8)).is_empty());
        assert_eq!(
            tr.poll(t0 + Duration::seconds(9)),
            vec![ComboAction::ToggleSleep]
        );
    }

    #[test]
    fn combos_track_independently() {
        let mut tr = tracker();
        let t0 = Local::now();

        tr.on_button(&event(PadButton::Select, ButtonState::Pressed, t0));
        tr.on_button(&event(PadButton::Start, ButtonState::Pressed, t0));
        tr.on_button(&event(
            PadButton::LeftBumper,
            ButtonState::Pressed,
            t0 + Duration::seconds(1),
        ));
        tr.on_button(&event(
            PadButton::RightBumper,
            ButtonState::Pressed,
            t0 + Duration::seconds(1),
        ));

        // Sleep combo matures first, speed combo a second later
        assert_eq!(
            tr.poll(t0 + Duration::seconds(3)),
            vec![ComboAction::ToggleSleep]
        );
        assert_eq!(
            tr.poll(t0 + Duration::seconds(4)),
            vec![ComboAction::ToggleSpeed]
        );
    }

    #[test]
    fn maturity_is_detected_by_polling_without_new_events() {
        let mut tr = tracker();
        let t0 = Local::now();

        tr.on_button(&event(PadButton::Select, ButtonState::Pressed, t0));
        tr.on_button(&event(PadButton::Start, ButtonState::Pressed, t0));

        // No further button traffic; the timer poll alone must fire it
        assert_eq!(
            tr.poll(t0 + Duration::milliseconds(3500)),
            vec![ComboAction::ToggleSleep]
        );
    }
}

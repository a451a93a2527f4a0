//! Gamepad input: raw event collection, axis shaping and combo detection.

pub mod collector;
pub mod combo;
pub mod normalize;

pub use collector::{
    ButtonEvent, ButtonState, CollectorError, CollectorHandle, CollectorSettings, PadButton,
    VelocityCommand,
};
pub use combo::{ComboAction, ComboTracker};
pub use normalize::shape_axis;

//! Video pipeline: capture source and drop-oldest frame fan-out.

pub mod hub;
pub mod source;

pub use hub::{Frame, FrameHub};
pub use source::{CameraSource, VideoError, VideoSource};

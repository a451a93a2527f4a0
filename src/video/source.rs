//! Video capture sources.
//!
//! The camera is asked for MJPEG so the device delivers frames already
//! JPEG-compressed; this crate treats the encoding itself as an opaque
//! codec concern and only moves buffers.

use bytes::Bytes;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use tracing::info;

use crate::config::VideoCfg;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Camera error: {0}")]
    Camera(#[from] NokhwaError),

    #[error("Camera delivered an empty frame")]
    EmptyFrame,
}

/// Blocking producer of encoded frames.
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> Result<Bytes, VideoError>;
}

pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    /// Open the configured capture device. Failure here is startup-fatal.
    pub fn open(cfg: &VideoCfg) -> Result<Self, VideoError> {
        let format = CameraFormat::new(
            Resolution::new(cfg.width, cfg.height),
            FrameFormat::MJPEG,
            cfg.fps,
        );
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(CameraIndex::Index(cfg.camera_index), requested)?;
        camera.open_stream()?;

        info!(
            "Opened camera {} at {}x{} @ {} fps",
            cfg.camera_index, cfg.width, cfg.height, cfg.fps
        );

        Ok(Self { camera })
    }
}

impl VideoSource for CameraSource {
    fn next_frame(&mut self) -> Result<Bytes, VideoError> {
        let raw = self.camera.frame_raw()?;
        if raw.is_empty() {
            return Err(VideoError::EmptyFrame);
        }
        Ok(Bytes::copy_from_slice(&raw))
    }
}

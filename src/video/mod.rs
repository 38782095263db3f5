//! Live video feed
//!
//! The station consumes an external device as a stream of frames. A dedicated
//! producer thread pulls frames from a [`VideoSource`] and publishes them into
//! a [`FrameChannel`]; connectivity changes go out on a watch channel.

mod camera;
mod channel;
mod producer;
mod still;

pub use camera::CameraSource;
pub use channel::FrameChannel;
pub use producer::{start_producer, ProducerHandle, ProducerSettings};
pub use still::StillImageSource;

use chrono::{DateTime, Local};
use image::RgbImage;
use std::fmt;
use std::sync::Arc;

/// Immutable snapshot of one video image.
///
/// Cloning is cheap: the pixel buffer is shared and never mutated after
/// capture.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap an image captured now
    pub fn new(image: RgbImage) -> Self {
        Self::with_timestamp(image, Local::now())
    }

    pub fn with_timestamp(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self {
            image: Arc::new(image),
            captured_at,
        }
    }

    /// Wrap an already shared image buffer captured now
    pub fn from_shared(image: Arc<RgbImage>) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }
}

/// Connectivity of the video source as seen by the producer thread
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStatus {
    #[default]
    Disconnected,
    Connected,
    Error(String),
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Disconnected => write!(f, "Camera disconnected"),
            SourceStatus::Connected => write!(f, "Camera connected"),
            SourceStatus::Error(reason) => write!(f, "Camera error: {}", reason),
        }
    }
}

/// A device that produces frames.
///
/// Sources are built, opened, read and dropped on the producer thread, so
/// device handles never cross threads. `next_frame` may block.
pub trait VideoSource {
    /// Human readable device name for logs
    fn name(&self) -> String;

    /// Acquire the device. Called once before the first `next_frame`.
    fn open(&mut self) -> Result<(), VideoError>;

    /// Read the next frame from the device.
    fn next_frame(&mut self) -> Result<Frame, VideoError>;
}

/// Builds a [`VideoSource`] on the producer thread
pub type SourceFactory = Box<dyn FnOnce() -> Result<Box<dyn VideoSource>, VideoError> + Send>;

/// Errors raised by video sources
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Could not open video source: {0}")]
    Open(String),

    #[error("Failed to read frame: {0}")]
    Read(String),

    #[error("Video source has no frames to serve")]
    NoFrames,

    #[error("No camera matching '{hint}' found (available: {available})")]
    NotFound { hint: String, available: String },
}

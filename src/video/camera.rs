//! Live camera video source backed by nokhwa
//!
//! The device is chosen by a case-insensitive substring of its name, so a
//! station can ask for "Dino" without knowing which index the OS assigned.

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use super::{Frame, VideoError, VideoSource};

pub struct CameraSource {
    name_hint: String,
    camera: Option<Camera>,
    device_name: Option<String>,
}

impl CameraSource {
    pub fn new(name_hint: impl Into<String>) -> Self {
        Self {
            name_hint: name_hint.into(),
            camera: None,
            device_name: None,
        }
    }
}

/// Index of the first device whose name contains `hint`, ignoring case.
/// An empty hint picks the first device.
fn select_camera(names: &[String], hint: &str) -> Option<usize> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return if names.is_empty() { None } else { Some(0) };
    }
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&hint))
}

impl VideoSource for CameraSource {
    fn name(&self) -> String {
        match &self.device_name {
            Some(name) => name.clone(),
            None => format!("camera '{}'", self.name_hint),
        }
    }

    fn open(&mut self) -> Result<(), VideoError> {
        let devices = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| VideoError::Open(format!("Failed to list cameras: {}", e)))?;
        let names: Vec<String> = devices.iter().map(|info| info.human_name()).collect();
        debug!("Cameras found: {:?}", names);

        let position = select_camera(&names, &self.name_hint).ok_or_else(|| {
            VideoError::NotFound {
                hint: self.name_hint.clone(),
                available: if names.is_empty() {
                    "none".to_string()
                } else {
                    names.join(", ")
                },
            }
        })?;
        let info = &devices[position];

        let format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(info.index().clone(), format)
            .map_err(|e| VideoError::Open(format!("{}: {}", info.human_name(), e)))?;
        camera
            .open_stream()
            .map_err(|e| VideoError::Open(format!("{}: {}", info.human_name(), e)))?;

        info!(
            "Opened camera '{}' at {}x{}",
            info.human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );
        self.device_name = Some(info.human_name());
        self.camera = Some(camera);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, VideoError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| VideoError::Read("camera is not open".to_string()))?;

        let buffer = camera
            .frame()
            .map_err(|e| VideoError::Read(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| VideoError::Read(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| VideoError::Read("frame buffer size mismatch".to_string()))?;
        Ok(Frame::new(image))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                warn!("Failed to stop camera stream: {}", e);
            }
        }
    }
}

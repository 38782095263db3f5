//! Still-image video source
//!
//! Serves the images of a directory as a looping feed. Each image stays on
//! screen for a dwell time before the next one is shown, which is enough to
//! scan a printed code and run a bench session without a microscope attached.

use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{Frame, VideoError, VideoSource};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct StillImageSource {
    dir: PathBuf,
    dwell: Duration,
    images: Vec<Arc<RgbImage>>,
    started: Option<Instant>,
}

impl StillImageSource {
    pub fn new(dir: impl Into<PathBuf>, dwell: Duration) -> Self {
        Self {
            dir: dir.into(),
            dwell: dwell.max(Duration::from_millis(1)),
            images: Vec::new(),
            started: None,
        }
    }

    /// Number of images loaded by `open`
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn image_paths(dir: &Path) -> Result<Vec<PathBuf>, VideoError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| VideoError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl VideoSource for StillImageSource {
    fn name(&self) -> String {
        format!("stills:{}", self.dir.display())
    }

    fn open(&mut self) -> Result<(), VideoError> {
        let paths = Self::image_paths(&self.dir)?;

        self.images = paths
            .iter()
            .filter_map(|path| match image::open(path) {
                Ok(img) => Some(Arc::new(img.to_rgb8())),
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable still image: {}", e);
                    None
                }
            })
            .collect();

        if self.images.is_empty() {
            return Err(VideoError::NoFrames);
        }

        info!(
            dir = %self.dir.display(),
            count = self.image_count(),
            "Loaded still images"
        );
        self.started = Some(Instant::now());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, VideoError> {
        if self.images.is_empty() {
            return Err(VideoError::NoFrames);
        }

        let elapsed = self.started.get_or_insert_with(Instant::now).elapsed();
        let step = (elapsed.as_millis() / self.dwell.as_millis()) as usize;
        let image = &self.images[step % self.images.len()];
        Ok(Frame::from_shared(Arc::clone(image)))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::thread;

    fn write_png(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
            .save(dir.join(name))
            .expect("failed to write test image");
    }

    #[test]
    fn test_cycles_through_images_in_name_order() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = StillImageSource::new(dir.path(), Duration::from_millis(200));
        source.open().expect("open should succeed");
        assert_eq!(source.image_count(), 2);

        let first = source.next_frame().unwrap();
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([10, 10, 10]));

        thread::sleep(Duration::from_millis(250));
        let second = source.next_frame().unwrap();
        assert_eq!(second.image().get_pixel(0, 0), &Rgb([20, 20, 20]));
    }

    #[test]
    fn test_empty_directory_has_no_frames() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut source = StillImageSource::new(dir.path(), Duration::from_secs(1));
        assert!(matches!(source.open(), Err(VideoError::NoFrames)));
        assert!(matches!(source.next_frame(), Err(VideoError::NoFrames)));
    }

    #[test]
    fn test_missing_directory_fails_to_open() {
        let mut source = StillImageSource::new("/nonexistent/stills/12345", Duration::from_secs(1));
        assert!(matches!(source.open(), Err(VideoError::Open(_))));
    }
}

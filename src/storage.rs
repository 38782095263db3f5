//! Local storage for captured images
//!
//! Each session gets its own folder named after the scanned identifier,
//! under the user's Documents folder or a custom location set in
//! preferences. Captures are written as `{category}_{point}.{ext}`.

use crate::error::StorageError;
use crate::preferences;
use crate::video::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions treated as capture images when purging a session folder
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Image format used for captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Jpeg,
    Png,
}

impl CaptureFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureFormat::Jpeg => "jpg",
            CaptureFormat::Png => "png",
        }
    }
}

/// Where session images live
pub trait SessionStorage: Send {
    /// Create (or reuse) the folder for `identifier` and return it
    fn open_session(&self, identifier: &str) -> Result<PathBuf, StorageError>;

    /// Delete every stored image under `location`; returns how many were removed
    fn purge(&self, location: &Path) -> Result<usize, StorageError>;

    /// Write `frame` as `{file_stem}.{ext}` under `location`
    fn save(&self, location: &Path, file_stem: &str, frame: &Frame)
        -> Result<PathBuf, StorageError>;

    /// Remove one stored image
    fn delete(&self, reference: &Path) -> Result<(), StorageError>;
}

/// Get the default captures directory
///
/// Returns the custom location from preferences if set,
/// otherwise returns the default location in Documents.
pub(crate) fn captures_dir() -> Option<PathBuf> {
    if let Some(custom) = preferences::get_storage_location() {
        return Some(custom);
    }
    preferences::default_storage_location()
}

/// Keep only characters that are safe in a folder name
pub(crate) fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Filesystem-backed [`SessionStorage`]
#[derive(Debug, Clone)]
pub struct FsStorage {
    base_dir: PathBuf,
    format: CaptureFormat,
    jpeg_quality: u8,
}

impl FsStorage {
    pub fn new(base_dir: impl Into<PathBuf>, format: CaptureFormat, jpeg_quality: u8) -> Self {
        Self {
            base_dir: base_dir.into(),
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Storage rooted at the configured captures directory
    pub fn from_preferences(format: CaptureFormat, jpeg_quality: u8) -> Result<Self, StorageError> {
        let base_dir = captures_dir().ok_or(StorageError::NoDocumentsDir)?;
        Ok(Self::new(base_dir, format, jpeg_quality))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    fn encode(&self, path: &Path, frame: &Frame) -> Result<(), StorageError> {
        let file = fs::File::create(path).map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);

        let encoded = match self.format {
            CaptureFormat::Jpeg => frame
                .image()
                .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)),
            CaptureFormat::Png => frame.image().write_with_encoder(PngEncoder::new(&mut writer)),
        };
        encoded.map_err(|e| StorageError::Encode {
            path: path.to_path_buf(),
            source: e,
        })?;

        writer.flush().map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl SessionStorage for FsStorage {
    fn open_session(&self, identifier: &str) -> Result<PathBuf, StorageError> {
        let folder = sanitize_identifier(identifier);
        if folder.is_empty() {
            return Err(StorageError::InvalidIdentifier(identifier.to_string()));
        }

        let session_dir = self.base_dir.join(folder);
        if !session_dir.exists() {
            fs::create_dir_all(&session_dir).map_err(|e| StorageError::CreateDirectory {
                path: session_dir.clone(),
                source: e,
            })?;
            info!("Created session directory: {:?}", session_dir);
        }

        Ok(session_dir)
    }

    fn purge(&self, location: &Path) -> Result<usize, StorageError> {
        if !location.exists() {
            return Ok(0);
        }

        let entries = fs::read_dir(location).map_err(|e| StorageError::ReadDirectory {
            path: location.to_path_buf(),
            source: e,
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_image_file(&path) {
                continue;
            }
            fs::remove_file(&path).map_err(|e| StorageError::DeleteFile {
                path: path.clone(),
                source: e,
            })?;
            debug!("Purged stale capture {:?}", path);
            removed += 1;
        }

        Ok(removed)
    }

    fn save(
        &self,
        location: &Path,
        file_stem: &str,
        frame: &Frame,
    ) -> Result<PathBuf, StorageError> {
        let path = location.join(format!("{}.{}", file_stem, self.format.extension()));
        self.encode(&path, frame)?;
        info!("Saved capture to: {:?}", path);
        Ok(path)
    }

    fn delete(&self, reference: &Path) -> Result<(), StorageError> {
        fs::remove_file(reference).map_err(|e| StorageError::DeleteFile {
            path: reference.to_path_buf(),
            source: e,
        })
    }
}

fn is_image_file(path: &Path) -> bool {
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
    use image::{Rgb, RgbImage};

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(16, 12, Rgb([200, 40, 40])))
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("  SK-01/23 "), "SK-0123");
        assert_eq!(sanitize_identifier("lot_7 A"), "lot_7 A");
        assert_eq!(sanitize_identifier("../.."), "");
    }

    #[test]
    fn test_open_session_creates_folder() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = FsStorage::new(dir.path(), CaptureFormat::Jpeg, 90);

        let location = storage.open_session("ABC/123").unwrap();
        assert_eq!(location, dir.path().join("ABC123"));
        assert!(location.is_dir());

        // Reopening the same identifier reuses the folder
        assert_eq!(storage.open_session("ABC123").unwrap(), location);
    }

    #[test]
    fn test_open_session_rejects_unusable_identifier() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = FsStorage::new(dir.path(), CaptureFormat::Jpeg, 90);
        assert!(matches!(
            storage.open_session("///"),
            Err(StorageError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_save_writes_decodable_image() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        for format in [CaptureFormat::Jpeg, CaptureFormat::Png] {
            let storage = FsStorage::new(dir.path(), format, 85);
            let location = storage.open_session("UNIT").unwrap();

            let path = storage.save(&location, "Pins_3", &frame()).unwrap();
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some(format!("Pins_3.{}", format.extension()).as_str())
            );

            let decoded = image::open(&path).expect("saved image should decode");
            assert_eq!((decoded.width(), decoded.height()), (16, 12));
        }
    }

    #[test]
    fn test_purge_removes_only_images() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = FsStorage::new(dir.path(), CaptureFormat::Png, 90);
        let location = storage.open_session("X").unwrap();

        storage.save(&location, "Top_1", &frame()).unwrap();
        storage.save(&location, "Top_2", &frame()).unwrap();
        fs::write(location.join("X_Report.pdf"), b"%PDF").unwrap();

        assert_eq!(storage.purge(&location).unwrap(), 2);
        assert!(!location.join("Top_1.png").exists());
        assert!(location.join("X_Report.pdf").exists());
        assert_eq!(storage.purge(&location).unwrap(), 0);
    }

    #[test]
    fn test_purge_missing_location_is_noop() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = FsStorage::new(dir.path(), CaptureFormat::Jpeg, 90);
        assert_eq!(storage.purge(&dir.path().join("never-created")).unwrap(), 0);
    }

    #[test]
    fn test_delete_missing_file_reports_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = FsStorage::new(dir.path(), CaptureFormat::Jpeg, 90);
        let err = storage.delete(&dir.path().join("gone.jpg")).unwrap_err();
        assert!(matches!(err, StorageError::DeleteFile { .. }));
    }

    #[test]
    fn test_capture_format_extension() {
        assert_eq!(CaptureFormat::Jpeg.extension(), "jpg");
        assert_eq!(CaptureFormat::Png.extension(), "png");
        assert_eq!(CaptureFormat::default(), CaptureFormat::Jpeg);
    }
}

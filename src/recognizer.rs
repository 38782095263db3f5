//! Optical code recognition
//!
//! [`CodeReader`] is the single-frame decoder; [`Recognizer`] wraps it with a
//! minimum-interval throttle and turns every decoder failure into "no code
//! found" so nothing escapes into the controller.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::video::Frame;

/// Default minimum time between two decode attempts
pub const DEFAULT_RECOGNIZE_INTERVAL: Duration = Duration::from_millis(500);

/// Decodes an optical code from a single frame
pub trait CodeReader: Send {
    fn decode(&mut self, frame: &Frame) -> Result<Option<String>, RecognizeError>;
}

/// Errors raised by code readers. Never surfaced past [`Recognizer`].
#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
    #[error("Decoder failed: {0}")]
    Decode(String),
}

/// Multi-format reader backed by `rxing`: QR, DataMatrix, Aztec, PDF417 and
/// the common 1D symbologies (Code 128, Code 39, EAN, UPC, ...)
#[derive(Debug, Default)]
pub struct BarcodeReader;

impl CodeReader for BarcodeReader {
    fn decode(&mut self, frame: &Frame) -> Result<Option<String>, RecognizeError> {
        let gray = image::imageops::grayscale(frame.image());
        let (width, height) = gray.dimensions();

        match rxing::helpers::detect_multiple_in_luma(gray.into_raw(), width, height) {
            Ok(results) => Ok(results
                .iter()
                .map(|result| result.getText().trim())
                .find(|text| !text.is_empty())
                .map(str::to_string)),
            Err(rxing::Exceptions::NotFoundException(_)) => Ok(None),
            Err(e) => Err(RecognizeError::Decode(format!("{:?}", e))),
        }
    }
}

/// Stand-in used when recognition is switched off; never finds a code
#[derive(Debug, Default)]
pub struct DisabledReader;

impl CodeReader for DisabledReader {
    fn decode(&mut self, _frame: &Frame) -> Result<Option<String>, RecognizeError> {
        Ok(None)
    }
}

/// Outcome of [`Recognizer::maybe_recognize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// Called again before the interval elapsed; the decoder was not run
    Throttled,
    NotFound,
    Found(String),
}

/// Throttled adapter around a [`CodeReader`]
pub struct Recognizer {
    reader: Box<dyn CodeReader>,
    interval: Duration,
    last_attempt: Option<Instant>,
    available: bool,
}

impl Recognizer {
    pub fn new(reader: Box<dyn CodeReader>, interval: Duration) -> Self {
        Self {
            reader,
            interval,
            last_attempt: None,
            available: true,
        }
    }

    /// A recognizer whose scanning never succeeds, flagged as unavailable
    pub fn disabled() -> Self {
        Self {
            reader: Box::new(DisabledReader),
            interval: DEFAULT_RECOGNIZE_INTERVAL,
            last_attempt: None,
            available: false,
        }
    }

    /// Whether a real decoder is wired in
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Run the decoder on `frame` unless the last attempt was less than the
    /// configured interval before `now`.
    pub fn maybe_recognize(&mut self, frame: &Frame, now: Instant) -> Recognition {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.interval {
                return Recognition::Throttled;
            }
        }
        self.last_attempt = Some(now);

        let reader = &mut self.reader;
        match panic::catch_unwind(AssertUnwindSafe(|| reader.decode(frame))) {
            Ok(Ok(Some(code))) => Recognition::Found(code),
            Ok(Ok(None)) => Recognition::NotFound,
            Ok(Err(e)) => {
                debug!("Code recognition failed: {}", e);
                Recognition::NotFound
            }
            Err(_) => {
                warn!("Code reader panicked; treating frame as having no code");
                Recognition::NotFound
            }
        }
    }

    /// Forget the last attempt so the next frame is decoded immediately
    pub fn reset_throttle(&mut self) {
        self.last_attempt = None;
    }
}

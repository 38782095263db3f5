//! Inspection session controller
//!
//! Owns the identity of the unit under test, the slot table and the shared
//! capture debouncer. Everything in here runs on the controller task; other
//! contexts only publish frames or enqueue [`TriggerEvent`]s.

mod debounce;
mod slots;

pub use debounce::{TriggerDebouncer, TriggerEvent, TriggerSource};
pub use slots::{Category, Layout, SlotPosition, SlotRef, SlotTable};

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, StorageError};
use crate::recognizer::{Recognition, Recognizer};
use crate::storage::SessionStorage;
use crate::video::FrameChannel;

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No unit identified; scanning for a code
    #[default]
    Idle,
    /// Unit identified, captures accepted
    Open,
    /// Every slot filled
    Complete,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "scanning"),
            SessionState::Open => write!(f, "capturing"),
            SessionState::Complete => write!(f, "complete"),
        }
    }
}

/// One slot as seen from outside the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub category: String,
    pub point: u32,
    pub path: Option<PathBuf>,
}

/// Serialisable view of the whole session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub identifier: Option<String>,
    pub location: Option<PathBuf>,
    pub filled: usize,
    pub total: usize,
    pub slots: Vec<SlotSnapshot>,
}

impl SessionSnapshot {
    /// Stored image for a given category and 1-based point, if captured
    pub fn image_for(&self, category: &str, point: u32) -> Option<&Path> {
        self.slots
            .iter()
            .find(|slot| slot.category == category && slot.point == point)
            .and_then(|slot| slot.path.as_deref())
    }
}

/// Lifecycle events published by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Identified {
        identifier: String,
        location: PathBuf,
        purged: usize,
    },
    SlotFilled {
        position: SlotPosition,
        path: PathBuf,
    },
    SlotCleared {
        position: SlotPosition,
    },
    Completed(SessionSnapshot),
    Reset,
}

/// The capture session state machine
pub struct SessionController {
    slots: SlotTable,
    recognizer: Recognizer,
    debouncer: TriggerDebouncer,
    frames: Arc<FrameChannel>,
    storage: Box<dyn SessionStorage>,
    state: SessionState,
    identifier: Option<String>,
    location: Option<PathBuf>,
    /// Sequence of the last frame handed to the recognizer
    last_scanned: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        layout: Arc<Layout>,
        frames: Arc<FrameChannel>,
        recognizer: Recognizer,
        debouncer: TriggerDebouncer,
        storage: Box<dyn SessionStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            slots: SlotTable::new(layout),
            recognizer,
            debouncer,
            frames,
            storage,
            state: SessionState::Idle,
            identifier: None,
            location: None,
            last_scanned: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn filled_count(&self) -> usize {
        self.slots.filled_count()
    }

    pub fn total_slots(&self) -> usize {
        self.slots.total_slots()
    }

    /// Whether scanning can ever succeed
    pub fn recognizer_available(&self) -> bool {
        self.recognizer.is_available()
    }

    /// Session open and at least one slot empty
    pub fn capture_ready(&self) -> bool {
        self.state == SessionState::Open && !self.slots.is_full()
    }

    /// Try to identify a unit from the newest frame.
    ///
    /// Does nothing outside `Idle`, when no new frame arrived since the last
    /// attempt, or while the recognizer is throttled. Returns the identifier
    /// when a session was opened.
    pub fn poll_recognition(&mut self, now: Instant) -> Result<Option<String>, CaptureError> {
        if self.state != SessionState::Idle {
            return Ok(None);
        }

        let Some((sequence, frame)) = self.frames.latest_since(self.last_scanned) else {
            return Ok(None);
        };

        match self.recognizer.maybe_recognize(&frame, now) {
            Recognition::Throttled => Ok(None),
            Recognition::NotFound => {
                self.last_scanned = sequence;
                Ok(None)
            }
            Recognition::Found(code) => {
                self.last_scanned = sequence;
                let code = code.trim().to_string();
                if code.is_empty() {
                    return Ok(None);
                }
                self.identify(&code)?;
                Ok(Some(code))
            }
        }
    }

    /// Open a session for `identifier`.
    ///
    /// The new location is prepared and purged of stale images first; only
    /// then is a session in progress replaced. If preparing fails, the
    /// current session is left as it was.
    pub fn identify(&mut self, identifier: &str) -> Result<(), CaptureError> {
        let (location, purged) = self.prepare_location(identifier).map_err(|source| {
            CaptureError::Identify {
                identifier: identifier.to_string(),
                source,
            }
        })?;

        if self.state != SessionState::Idle {
            info!(
                previous = ?self.identifier,
                next = identifier,
                "New identifier while a session is active; resetting"
            );
            self.reset();
        }

        self.slots.clear_all();
        self.debouncer.reset();
        self.identifier = Some(identifier.to_string());
        self.location = Some(location.clone());
        self.state = SessionState::Open;

        info!(identifier, "Session opened at {:?}", location);
        self.emit(SessionEvent::Identified {
            identifier: identifier.to_string(),
            location,
            purged,
        });
        Ok(())
    }

    fn prepare_location(&self, identifier: &str) -> Result<(PathBuf, usize), StorageError> {
        let location = self.storage.open_session(identifier)?;
        let purged = self.storage.purge(&location)?;
        if purged > 0 {
            info!(identifier, purged, "Purged stale captures from {:?}", location);
        }
        Ok((location, purged))
    }

    /// Evaluate a capture request against the session and the shared
    /// debouncer, and on acceptance store the newest frame in the first empty
    /// slot.
    pub fn handle_trigger(&mut self, event: &TriggerEvent) -> Result<SlotPosition, CaptureError> {
        match self.state {
            SessionState::Idle => return Err(CaptureError::NotOpen),
            SessionState::Complete => return Err(CaptureError::AlreadyFull),
            SessionState::Open => {}
        }

        let index = self.slots.first_empty().ok_or(CaptureError::AlreadyFull)?;
        let frame = self.frames.latest().ok_or(CaptureError::NoFrameAvailable)?;

        let ready = self.capture_ready();
        if !self.debouncer.check(event, ready) {
            debug!(source = %event.source, "Trigger inside cooldown window");
            return Err(CaptureError::Cooldown);
        }

        let location = self.location.clone().ok_or(CaptureError::NotOpen)?;
        let layout = Arc::clone(self.slots.layout());
        let total = layout.total_slots();
        let position = layout
            .position(index)
            .ok_or(CaptureError::InvalidSlot { index, total })?;
        let stem = layout
            .file_stem(index)
            .ok_or(CaptureError::InvalidSlot { index, total })?;

        // Only a stored capture starts a cooldown window
        let path = self.storage.save(&location, &stem, &frame)?;
        self.slots.fill(
            index,
            SlotRef {
                path: path.clone(),
                point: position.point,
            },
        )?;
        self.debouncer.commit(event);

        info!(
            source = %event.source,
            index,
            category = %position.category,
            point = position.point,
            filled = self.slots.filled_count(),
            total,
            frame_time = %frame.captured_at().format("%H:%M:%S%.3f"),
            width = frame.width(),
            height = frame.height(),
            "Slot filled"
        );
        self.emit(SessionEvent::SlotFilled {
            position: position.clone(),
            path,
        });

        if self.slots.is_full() {
            self.state = SessionState::Complete;
            info!(identifier = ?self.identifier, "All slots filled");
            self.emit(SessionEvent::Completed(self.snapshot()));
        }

        Ok(position)
    }

    /// Clear a filled slot and delete its stored image.
    ///
    /// Confirmation is the caller's business. A failed file delete is logged
    /// and the slot is cleared anyway. Returns `false` when the slot was
    /// already empty.
    pub fn delete_slot(&mut self, index: usize) -> Result<bool, CaptureError> {
        if self.state == SessionState::Idle {
            return Err(CaptureError::NotOpen);
        }

        let total = self.slots.total_slots();
        let position = self
            .slots
            .layout()
            .position(index)
            .ok_or(CaptureError::InvalidSlot { index, total })?;

        let Some(reference) = self.slots.clear(index)? else {
            return Ok(false);
        };

        if let Err(e) = self.storage.delete(&reference.path) {
            warn!(index, "Slot cleared but image could not be deleted: {}", e);
        }

        if self.state == SessionState::Complete {
            self.state = SessionState::Open;
        }

        info!(index, category = %position.category, point = position.point, "Slot cleared");
        self.emit(SessionEvent::SlotCleared { position });
        Ok(true)
    }

    /// Return to scanning. Stored images stay on disk.
    pub fn reset(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        self.slots.clear_all();
        self.debouncer.reset();
        self.recognizer.reset_throttle();
        self.identifier = None;
        self.location = None;
        self.state = SessionState::Idle;

        info!("Session reset; scanning for a new unit");
        self.emit(SessionEvent::Reset);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let layout = self.slots.layout();
        let slots = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let position = layout.position(index)?;
                Some(SlotSnapshot {
                    index,
                    category: position.category,
                    point: position.point,
                    path: slot.reference().map(|r| r.path.clone()),
                })
            })
            .collect();

        SessionSnapshot {
            state: self.state,
            identifier: self.identifier.clone(),
            location: self.location.clone(),
            filled: self.slots.filled_count(),
            total: self.slots.total_slots(),
            slots,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

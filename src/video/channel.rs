//! Single-slot, latest-wins hand-off of frames from the producer thread.

use std::sync::{Mutex, MutexGuard};

use super::Frame;

#[derive(Default)]
struct Latest {
    sequence: u64,
    frame: Option<Frame>,
}

/// Holds the newest frame published by the video producer.
///
/// `publish` replaces whatever is stored and never queues; readers get either
/// the previous or the new frame, never a partial one. The lock is only held
/// for the pointer swap, so neither side blocks on the other in practice.
#[derive(Default)]
pub struct FrameChannel {
    latest: Mutex<Latest>,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame with `frame`.
    pub fn publish(&self, frame: Frame) {
        let mut guard = self.lock();
        guard.sequence = guard.sequence.wrapping_add(1);
        guard.frame = Some(frame);
    }

    /// The most recent frame, or `None` if nothing has been published yet.
    pub fn latest(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }

    /// The most recent frame if it is newer than sequence number `seen`.
    ///
    /// Returns the frame together with its sequence number so the caller can
    /// skip frames it already looked at.
    pub fn latest_since(&self, seen: u64) -> Option<(u64, Frame)> {
        let guard = self.lock();
        if guard.sequence == seen {
            return None;
        }
        guard.frame.clone().map(|frame| (guard.sequence, frame))
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        // A panic while holding the guard cannot leave a half-written frame:
        // the only mutation is a whole-value assignment.
        match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

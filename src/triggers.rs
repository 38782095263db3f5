//! Hand-off queue for capture triggers
//!
//! Keyboard, console and hardware sources run on their own threads. They only
//! ever push a [`TriggerEvent`] into a bounded queue; the controller task
//! drains it.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::session::{TriggerEvent, TriggerSource};

/// Create the trigger queue
pub(crate) fn trigger_channel(capacity: usize) -> (mpsc::Sender<TriggerEvent>, mpsc::Receiver<TriggerEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Non-blocking producer end bound to one trigger source.
///
/// Safe to call from any thread, including ones outside the tokio runtime.
#[derive(Debug, Clone)]
pub(crate) struct TriggerSender {
    tx: mpsc::Sender<TriggerEvent>,
    source: TriggerSource,
}

impl TriggerSender {
    pub fn new(tx: mpsc::Sender<TriggerEvent>, source: TriggerSource) -> Self {
        Self { tx, source }
    }

    /// Enqueue a trigger stamped now. Returns `false` if it was dropped.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(TriggerEvent::now(self.source)) {
            Ok(()) => {
                debug!(source = %self.source, "Trigger queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                // A full queue already holds more presses than the cooldown lets through
                warn!(source = %self.source, "Trigger queue full; dropping press");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(source = %self.source, "Trigger queue closed");
                false
            }
        }
    }
}

//! Console rendering of session state and lifecycle events

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::CaptureError;
use crate::session::{SessionEvent, SessionSnapshot, SessionState};
use crate::video::SourceStatus;

/// One line per category: `[01 x] [02 .] ...` using 1-based slot numbers
pub(crate) fn render_grid(snapshot: &SessionSnapshot) -> String {
    let mut out = match &snapshot.identifier {
        Some(identifier) => format!(
            "Unit {} [{}] {}/{}\n",
            identifier, snapshot.state, snapshot.filled, snapshot.total
        ),
        None => format!("No unit [{}] - scan a code\n", snapshot.state),
    };

    let width = snapshot.total.to_string().len();
    let name_width = snapshot
        .slots
        .iter()
        .map(|s| s.category.chars().count())
        .max()
        .unwrap_or(0);

    let mut current: Option<&str> = None;
    for slot in &snapshot.slots {
        if current != Some(slot.category.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("  {:<name_width$} ", slot.category));
            current = Some(slot.category.as_str());
        }
        let mark = if slot.path.is_some() { 'x' } else { '.' };
        out.push_str(&format!(" [{:0width$} {}]", slot.index + 1, mark));
    }
    if current.is_some() {
        out.push('\n');
    }
    out
}

pub(crate) fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Identified {
            identifier,
            location,
            purged,
        } => {
            let mut line = format!("Unit {} identified; saving to {}", identifier, location.display());
            if *purged > 0 {
                line.push_str(&format!(" ({} stale images removed)", purged));
            }
            line
        }
        SessionEvent::SlotFilled { position, .. } => format!(
            "Captured {} {} (slot {})",
            position.category,
            position.point,
            position.index + 1
        ),
        SessionEvent::SlotCleared { position } => format!(
            "Cleared {} {} (slot {})",
            position.category,
            position.point,
            position.index + 1
        ),
        SessionEvent::Completed(snapshot) => format!(
            "All {} images captured - exporting report",
            snapshot.total
        ),
        SessionEvent::Reset => "Session reset - waiting for a code scan".to_string(),
    }
}

/// Operator-facing text for a rejected action
pub(crate) fn describe_rejection(error: &CaptureError) -> String {
    match error {
        CaptureError::Storage(e) => format!("Capture failed: {}", e),
        CaptureError::Identify { .. } => format!("Identification failed: {}", error),
        other => format!("Rejected: {}", other),
    }
}

pub(crate) fn describe_status(status: &SourceStatus) -> String {
    match status {
        SourceStatus::Connected => "Camera connected".to_string(),
        SourceStatus::Disconnected => "Camera offline".to_string(),
        SourceStatus::Error(reason) => format!("Camera error: {}", reason),
    }
}

pub(crate) fn scanning_hint(state: SessionState, recognizer_available: bool) -> Option<&'static str> {
    if state == SessionState::Idle && !recognizer_available {
        Some("Code scanning is disabled - enter the unit with 'id CODE'")
    } else {
        None
    }
}

/// Event handler loop that prints lifecycle events
async fn run_presenter(mut event_rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                println!("{}", describe_event(&event));
                if let SessionEvent::Completed(snapshot) = &event {
                    print!("{}", render_grid(snapshot));
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Presenter fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Which capture triggers are live, so a disabled source is visible at start
pub(crate) fn describe_trigger_sources(hotkeys: Option<&[String]>, touch_live: bool) -> String {
    let keyboard = match hotkeys {
        Some(keys) => format!("keyboard ({})", keys.join(", ")),
        None => "keyboard: off".to_string(),
    };
    let touch = if touch_live { "touch sensor" } else { "touch sensor: off" };
    format!("Capture triggers: console 'c', {}, {}", keyboard, touch)
}

/// Spawn the presenter task
pub(crate) fn spawn_presenter(event_rx: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(run_presenter(event_rx));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::session::{SlotPosition, SlotSnapshot};
    use std::path::PathBuf;

    fn snapshot() -> SessionSnapshot {
        let slot = |index: usize, category: &str, point: u32, filled: bool| SlotSnapshot {
            index,
            category: category.to_string(),
            point,
            path: filled.then(|| PathBuf::from(format!("/c/{}_{}.jpg", category, point))),
        };
        SessionSnapshot {
            state: SessionState::Open,
            identifier: Some("ABC123".into()),
            location: Some(PathBuf::from("/c")),
            filled: 2,
            total: 4,
            slots: vec![
                slot(0, "Top", 1, true),
                slot(1, "Top", 2, true),
                slot(2, "Bottom", 1, false),
                slot(3, "Bottom", 2, false),
            ],
        }
    }

    #[test]
    fn test_render_grid() {
        let grid = render_grid(&snapshot());
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines[0], "Unit ABC123 [capturing] 2/4");
        assert_eq!(lines[1], "  Top     [1 x] [2 x]");
        assert_eq!(lines[2], "  Bottom  [3 .] [4 .]");
    }

    #[test]
    fn test_render_idle() {
        let mut idle = snapshot();
        idle.identifier = None;
        idle.state = SessionState::Idle;
        assert!(render_grid(&idle).starts_with("No unit [scanning]"));
    }

    #[test]
    fn test_describe_events() {
        let position = SlotPosition {
            index: 2,
            category_index: 1,
            category: "Bottom".into(),
            point: 1,
        };
        assert_eq!(
            describe_event(&SessionEvent::SlotFilled {
                position: position.clone(),
                path: PathBuf::from("/c/Bottom_1.jpg"),
            }),
            "Captured Bottom 1 (slot 3)"
        );
        assert_eq!(
            describe_event(&SessionEvent::SlotCleared { position }),
            "Cleared Bottom 1 (slot 3)"
        );
        assert!(describe_event(&SessionEvent::Identified {
            identifier: "X".into(),
            location: PathBuf::from("/c/X"),
            purged: 3,
        })
        .contains("3 stale images removed"));
    }

    #[test]
    fn test_rejections_are_distinct() {
        let reasons: Vec<String> = [
            CaptureError::NotOpen,
            CaptureError::AlreadyFull,
            CaptureError::NoFrameAvailable,
            CaptureError::Cooldown,
        ]
        .iter()
        .map(describe_rejection)
        .collect();

        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_identify_failure_is_not_reported_as_capture() {
        let error = CaptureError::Identify {
            identifier: "///".into(),
            source: StorageError::InvalidIdentifier("///".into()),
        };
        let reason = describe_rejection(&error);
        assert!(reason.starts_with("Identification failed"));
        assert!(!reason.contains("capture"));
    }

    #[test]
    fn test_trigger_sources_show_disabled_capabilities() {
        let keys = vec!["F12".to_string(), "F11".to_string()];
        assert_eq!(
            describe_trigger_sources(Some(&keys), false),
            "Capture triggers: console 'c', keyboard (F12, F11), touch sensor: off"
        );
        assert_eq!(
            describe_trigger_sources(None, true),
            "Capture triggers: console 'c', keyboard: off, touch sensor"
        );
    }

    #[test]
    fn test_scanning_hint() {
        assert!(scanning_hint(SessionState::Idle, false).is_some());
        assert!(scanning_hint(SessionState::Idle, true).is_none());
        assert!(scanning_hint(SessionState::Open, false).is_none());
    }
}

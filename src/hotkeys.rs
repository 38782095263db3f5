//! Global hotkey capture triggers
//!
//! Keyboard shortcuts that request a capture, working even when the station
//! window is in the background.

use global_hotkey::{hotkey::HotKey, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

use crate::triggers::TriggerSender;

/// Sleep between polls of the hotkey event receiver
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub(crate) enum HotkeyError {
    #[error("Failed to create hotkey manager: {0}")]
    Manager(String),

    #[error("Invalid hotkey '{key}': {reason}")]
    Parse { key: String, reason: String },

    #[error("Failed to register hotkey '{key}': {reason}")]
    Register { key: String, reason: String },

    #[error("No capture hotkeys configured")]
    Empty,

    #[error("Global hotkeys unsupported here: {0}")]
    Unsupported(String),
}

/// Parse key names such as `F12` or `shift+Space`
pub(crate) fn parse_hotkeys(keys: &[String]) -> Result<Vec<HotKey>, HotkeyError> {
    let mut hotkeys: Vec<HotKey> = Vec::with_capacity(keys.len());
    for key in keys {
        let hotkey: HotKey = key.trim().parse().map_err(|e| HotkeyError::Parse {
            key: key.clone(),
            reason: format!("{}", e),
        })?;
        if !hotkeys.iter().any(|h| h.id() == hotkey.id()) {
            hotkeys.push(hotkey);
        }
    }
    if hotkeys.is_empty() {
        return Err(HotkeyError::Empty);
    }
    Ok(hotkeys)
}

/// Whether global hotkeys can fire in a console process on this platform
fn platform_support() -> Result<(), HotkeyError> {
    if cfg!(target_os = "macos") {
        // Hotkey events are delivered through the main-thread run loop,
        // which the station never runs
        return Err(HotkeyError::Unsupported(
            "macOS delivers hotkeys only to an application run loop".to_string(),
        ));
    }
    Ok(())
}

/// Create the manager and register `hotkeys` on the calling thread
fn register(hotkeys: &[HotKey]) -> Result<GlobalHotKeyManager, HotkeyError> {
    let manager = GlobalHotKeyManager::new().map_err(|e| HotkeyError::Manager(e.to_string()))?;

    for hotkey in hotkeys {
        manager
            .register(*hotkey)
            .map_err(|e| HotkeyError::Register {
                key: format!("{:?}", hotkey),
                reason: e.to_string(),
            })?;
        info!("Registered global hotkey: {:?} (capture)", hotkey);
    }
    Ok(manager)
}

/// Dispatch pending window messages of this thread.
///
/// On Windows the manager's hidden window only sees `WM_HOTKEY` when the
/// thread that created it runs a message loop.
#[cfg(windows)]
fn pump_messages() {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    // SAFETY: MSG is plain data filled in by PeekMessageW, and the calls only
    // touch this thread's own message queue.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
fn pump_messages() {}

/// Queue a capture trigger if `event` is a press of one of `ids`
fn dispatch(event: &GlobalHotKeyEvent, ids: &[u32], trigger: &TriggerSender) -> bool {
    // Only handle key press, ignore key release
    if event.state != HotKeyState::Pressed || !ids.contains(&event.id) {
        return false;
    }
    trigger.fire()
}

/// Poll loop of the listener thread; returns once `running` is cleared
fn listen(ids: &[u32], trigger: &TriggerSender, running: &AtomicBool) {
    let receiver = GlobalHotKeyEvent::receiver();
    while running.load(Ordering::SeqCst) {
        pump_messages();
        // Use try_recv with sleep to avoid blocking past a stop request
        match receiver.try_recv() {
            Ok(event) => {
                if dispatch(&event, ids, trigger) {
                    info!("Capture hotkey pressed");
                }
            }
            Err(_) => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Handle for the hotkey listener thread. Stopping it unregisters the keys.
pub(crate) struct HotkeyListener {
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Hotkey listener thread panicked");
            }
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Register the capture hotkeys and start listening for them.
///
/// The manager is created, used and dropped on a dedicated thread (not a
/// tokio task) that pumps the platform messages and only enqueues key
/// triggers; it never touches session state. Returns an error when the
/// keys cannot fire, so the caller can report the source as disabled.
pub(crate) fn start_hotkey_listener(
    keys: &[String],
    trigger: TriggerSender,
) -> Result<HotkeyListener, HotkeyError> {
    let hotkeys = parse_hotkeys(keys)?;
    platform_support()?;

    let is_running = Arc::new(AtomicBool::new(true));
    let running = Arc::clone(&is_running);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    let thread_handle = std::thread::Builder::new()
        .name("hotkey-listener".to_string())
        .spawn(move || {
            let manager = match register(&hotkeys) {
                Ok(manager) => manager,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            info!("Hotkey listener started on dedicated thread");

            let ids: Vec<u32> = hotkeys.iter().map(HotKey::id).collect();
            listen(&ids, &trigger, &running);
            drop(manager);
        })
        .map_err(|e| HotkeyError::Manager(format!("Failed to spawn hotkey listener: {}", e)))?;

    let mut listener = HotkeyListener {
        is_running,
        thread_handle: Some(thread_handle),
    };
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(listener),
        Ok(Err(e)) => {
            listener.stop();
            Err(e)
        }
        Err(_) => {
            listener.stop();
            Err(HotkeyError::Manager(
                "hotkey listener exited during start-up".to_string(),
            ))
        }
    }
}

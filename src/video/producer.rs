//! Frame producer thread
//!
//! Pulls frames from a [`VideoSource`] at a fixed cadence and publishes them
//! into the shared [`FrameChannel`]. Read failures pause and retry; only the
//! stop flag ends the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{FrameChannel, SourceFactory, SourceStatus, VideoError, VideoSource};

/// Granularity at which sleeping loops re-check the stop flag
const STOP_POLL: Duration = Duration::from_millis(10);

/// Timing for the producer loop
#[derive(Debug, Clone, Copy)]
pub struct ProducerSettings {
    /// Pause between reads (~30 frames per second by default)
    pub frame_interval: Duration,
    /// Pause after a failed read before trying again
    pub retry_delay: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Handle for controlling the producer thread from the controller side
///
/// Stopping is cooperative: the thread notices the flag within one frame
/// interval, releases the device and exits. The thread is also stopped when
/// this handle is dropped.
pub struct ProducerHandle {
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    /// Signal the producer to stop and wait for it to release the device
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Video producer thread panicked");
            }
            info!("Video producer stopped");
        }
    }

    /// Check if the producer loop is still running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the producer on a dedicated thread.
///
/// The source is built and opened on that thread; a failure to do either is
/// reported as `SourceStatus::Error` and ends the thread.
pub fn start_producer(
    factory: SourceFactory,
    frames: Arc<FrameChannel>,
    status_tx: watch::Sender<SourceStatus>,
    settings: ProducerSettings,
) -> Result<ProducerHandle, VideoError> {
    let is_running = Arc::new(AtomicBool::new(true));
    let is_running_clone = is_running.clone();

    let thread_handle = thread::Builder::new()
        .name("video-producer".to_string())
        .spawn(move || {
            let source = match factory() {
                Ok(source) => source,
                Err(e) => {
                    error!("Failed to create video source: {}", e);
                    status_tx.send_replace(SourceStatus::Error(e.to_string()));
                    is_running_clone.store(false, Ordering::SeqCst);
                    return;
                }
            };
            run_producer(source, &frames, &status_tx, &is_running_clone, settings);
        })
        .map_err(|e| VideoError::Open(format!("Failed to spawn producer thread: {}", e)))?;

    Ok(ProducerHandle {
        is_running,
        thread_handle: Some(thread_handle),
    })
}

/// Run the producer loop on the current thread (blocking)
fn run_producer(
    mut source: Box<dyn VideoSource>,
    frames: &FrameChannel,
    status_tx: &watch::Sender<SourceStatus>,
    is_running: &AtomicBool,
    settings: ProducerSettings,
) {
    let name = source.name();

    if let Err(e) = source.open() {
        error!(source = %name, "Failed to open video source: {}", e);
        status_tx.send_replace(SourceStatus::Error(e.to_string()));
        is_running.store(false, Ordering::SeqCst);
        return;
    }

    info!(source = %name, "Video source connected");
    status_tx.send_replace(SourceStatus::Connected);

    let mut failing = false;
    while is_running.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(frame) => {
                frames.publish(frame);
                if failing {
                    info!(source = %name, "Video source recovered");
                    status_tx.send_replace(SourceStatus::Connected);
                    failing = false;
                }
            }
            Err(e) => {
                if !failing {
                    warn!(source = %name, "Frame read failed, retrying: {}", e);
                    status_tx.send_replace(SourceStatus::Error(e.to_string()));
                    failing = true;
                }
                sleep_while_running(is_running, settings.retry_delay);
            }
        }

        sleep_while_running(is_running, settings.frame_interval);
    }

    // Release the device before announcing the disconnect
    drop(source);
    info!(source = %name, frames = frames.sequence(), "Video source released");
    status_tx.send_replace(SourceStatus::Disconnected);
}

/// Sleep for `total`, waking early if the stop flag is cleared
fn sleep_while_running(is_running: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && is_running.load(Ordering::SeqCst) {
        let step = remaining.min(STOP_POLL);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::Frame;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct FakeSource {
        reads: Arc<AtomicUsize>,
        fail_first: usize,
        fail_open: bool,
        released: Arc<AtomicBool>,
    }

    impl FakeSource {
        fn new(fail_first: usize) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let released = Arc::new(AtomicBool::new(false));
            let source = Self {
                reads: reads.clone(),
                fail_first,
                fail_open: false,
                released: released.clone(),
            };
            (source, reads, released)
        }
    }

    impl VideoSource for FakeSource {
        fn name(&self) -> String {
            "fake".to_string()
        }

        fn open(&mut self) -> Result<(), VideoError> {
            if self.fail_open {
                return Err(VideoError::Open("device busy".to_string()));
            }
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame, VideoError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(VideoError::Read("usb hiccup".to_string()));
            }
            Ok(Frame::new(RgbImage::from_pixel(4, 4, Rgb([n as u8, 0, 0]))))
        }
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn factory(source: FakeSource) -> SourceFactory {
        Box::new(move || Ok(Box::new(source) as Box<dyn VideoSource>))
    }

    fn fast_settings() -> ProducerSettings {
        ProducerSettings {
            frame_interval: Duration::from_millis(1),
            retry_delay: Duration::from_millis(5),
        }
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_producer_publishes_and_stops() {
        let (source, _reads, released) = FakeSource::new(0);
        let frames = Arc::new(FrameChannel::new());
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);

        let mut handle =
            start_producer(factory(source), frames.clone(), status_tx, fast_settings())
                .expect("producer should start");

        assert!(wait_until(Duration::from_secs(2), || frames.sequence() >= 3));
        assert_eq!(*status_rx.borrow(), SourceStatus::Connected);

        handle.stop();
        assert!(!handle.is_running());
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(*status_rx.borrow(), SourceStatus::Disconnected);
    }

    #[test]
    fn test_read_failures_retry_instead_of_stopping() {
        let (source, reads, _released) = FakeSource::new(3);
        let frames = Arc::new(FrameChannel::new());
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);

        let mut handle =
            start_producer(factory(source), frames.clone(), status_tx, fast_settings())
                .expect("producer should start");

        assert!(wait_until(Duration::from_secs(2), || frames.sequence() >= 1));
        assert!(reads.load(Ordering::SeqCst) > 3);
        assert!(handle.is_running());
        assert!(wait_until(Duration::from_secs(2), || *status_rx.borrow()
            == SourceStatus::Connected));

        handle.stop();
    }

    #[test]
    fn test_open_failure_reports_error_status() {
        let (mut source, _reads, released) = FakeSource::new(0);
        source.fail_open = true;
        let frames = Arc::new(FrameChannel::new());
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);

        let mut handle =
            start_producer(factory(source), frames.clone(), status_tx, fast_settings())
                .expect("producer should start");

        assert!(wait_until(Duration::from_secs(2), || released
            .load(Ordering::SeqCst)));
        handle.stop();

        assert!(frames.latest().is_none());
        assert!(matches!(*status_rx.borrow(), SourceStatus::Error(_)));
    }

    #[test]
    fn test_stop_is_bounded_during_retry_sleep() {
        let (source, _reads, _released) = FakeSource::new(usize::MAX);
        let frames = Arc::new(FrameChannel::new());
        let (status_tx, _status_rx) = watch::channel(SourceStatus::Disconnected);
        let settings = ProducerSettings {
            frame_interval: Duration::from_millis(1),
            retry_delay: Duration::from_secs(30),
        };

        let mut handle = start_producer(factory(source), frames, status_tx, settings)
            .expect("producer should start");
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_device_reports_error_status() {
        let frames = Arc::new(FrameChannel::new());
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);
        let missing: SourceFactory = Box::new(|| {
            Err(VideoError::NotFound {
                hint: "Dino".to_string(),
                available: "Integrated Webcam".to_string(),
            })
        });

        let mut handle = start_producer(missing, frames.clone(), status_tx, fast_settings())
            .expect("producer should start");
        assert!(wait_until(Duration::from_secs(2), || !handle.is_running()));
        handle.stop();

        assert!(frames.latest().is_none());
        match &*status_rx.borrow() {
            SourceStatus::Error(reason) => assert!(reason.contains("Dino")),
            other => panic!("expected an error status, got {:?}", other),
        };
    }
}

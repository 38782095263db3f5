#![deny(clippy::all)]

mod config;
mod error;
mod export;
mod hotkeys;
mod preferences;
mod recognizer;
mod session;
mod station;
mod storage;
mod touch;
mod triggers;
mod video;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::VideoSourceKind;
use crate::export::{Exporter, Notifier, PdfReport, SmtpCredentials, SmtpNotifier};
use crate::recognizer::{BarcodeReader, Recognizer};
use crate::session::{SessionController, TriggerDebouncer, TriggerSource};
use crate::station::describe_trigger_sources;
use crate::storage::FsStorage;
use crate::touch::{TouchDevice, UnavailableTouchDevice};
use crate::triggers::{trigger_channel, TriggerSender};
use crate::video::{
    CameraSource, FrameChannel, ProducerSettings, SourceFactory, SourceStatus, StillImageSource,
    VideoSource,
};

/// Default still-image feed directory, relative to the working directory
const DEFAULT_FEED_DIR: &str = "feed";

/// Capacity of the console line queue
const COMMAND_QUEUE: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so RUST_LOG and SMTP settings from it apply
    let dotenv = dotenvy::dotenv();

    // Initialize tracing for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {:?}", path);
    }

    let config = config::load_config().context("Failed to load configuration")?;
    let prefs = preferences::load_preferences();

    let profile = match config.profile(prefs.profile.as_deref()) {
        Ok(profile) => profile,
        Err(e) => {
            warn!(
                available = ?config.profile_names(),
                "{}; using active profile '{}'",
                e,
                config.active_profile
            );
            config.profile(None)?
        }
    };
    let layout = Arc::new(profile.layout()?);
    info!(
        profile = %profile.name,
        categories = layout.categories().len(),
        slots = layout.total_slots(),
        "Loaded capture profile"
    );

    // Video feed on its own thread
    let frames = Arc::new(FrameChannel::new());
    let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);
    let source: SourceFactory = match config.video.source {
        VideoSourceKind::Camera => {
            let hint = config.video.camera_name.clone();
            info!("Using camera matching '{}'", hint);
            Box::new(move || Ok(Box::new(CameraSource::new(hint)) as Box<dyn VideoSource>))
        }
        VideoSourceKind::Stills => {
            let feed_dir = config
                .video
                .source_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FEED_DIR));
            let dwell = config.video.dwell();
            info!("Using still images from {}", feed_dir.display());
            Box::new(move || {
                Ok(Box::new(StillImageSource::new(feed_dir, dwell)) as Box<dyn VideoSource>)
            })
        }
    };
    let mut producer = video::start_producer(
        source,
        Arc::clone(&frames),
        status_tx,
        ProducerSettings {
            frame_interval: config.capture.frame_interval(),
            retry_delay: config.capture.retry_delay(),
        },
    )?;

    let recognizer = if config.capture.recognition_enabled {
        Recognizer::new(Box::new(BarcodeReader), config.capture.recognize_interval())
    } else {
        info!("Code recognition disabled in configuration");
        Recognizer::disabled()
    };

    let storage = FsStorage::from_preferences(config.capture.format, config.capture.jpeg_quality)?;
    info!("Captures are stored under {:?}", storage.base_dir());

    let controller = SessionController::new(
        Arc::clone(&layout),
        Arc::clone(&frames),
        recognizer,
        TriggerDebouncer::new(config.capture.cooldown()),
        Box::new(storage),
    );

    // Trigger sources only enqueue; the station drains the queue
    let (trigger_tx, trigger_rx) = trigger_channel(config.capture.trigger_queue);

    let mut hotkey_listener = None;
    if config.hotkeys.enabled {
        match hotkeys::start_hotkey_listener(
            &config.hotkeys.capture,
            TriggerSender::new(trigger_tx.clone(), TriggerSource::Key),
        ) {
            Ok(listener) => hotkey_listener = Some(listener),
            Err(e) => warn!("Keyboard capture disabled: {}", e),
        }
    }

    let mut touch_device: Box<dyn TouchDevice> = Box::new(UnavailableTouchDevice);
    let touch_live = config.touch.enabled
        && touch::attach_touch_trigger(
            touch_device.as_mut(),
            TriggerSender::new(trigger_tx.clone(), TriggerSource::Hardware),
        );
    println!(
        "{}",
        describe_trigger_sources(
            hotkey_listener.is_some().then_some(config.hotkeys.capture.as_slice()),
            touch_live,
        )
    );
    drop(trigger_tx);

    // Export pipeline
    let notifier: Option<Box<dyn Notifier>> = match SmtpCredentials::from_env() {
        Some(credentials) => match SmtpNotifier::new(&config.smtp, credentials) {
            Ok(notifier) => Some(Box::new(notifier)),
            Err(e) => {
                warn!("SMTP relay {} unusable, reports will not be emailed: {}", config.smtp.server, e);
                None
            }
        },
        None => {
            info!("SMTP credentials not set; reports will not be emailed");
            None
        }
    };
    let report = PdfReport::new(config.report.clone(), Arc::clone(&layout), profile.images_per_row);
    let exporter = Arc::new(Exporter::new(
        Box::new(report),
        notifier,
        config.report.open_after_export,
    ));
    export::spawn_export_handler(controller.subscribe(), Arc::clone(&exporter));
    station::spawn_presenter(controller.subscribe());

    // Operator console
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    station::spawn_stdin_reader(command_tx);
    println!("Inspection station ready. Type 'help' for commands.");

    let station = station::Station::new(
        controller,
        exporter,
        trigger_rx,
        command_rx,
        status_rx,
        config.capture.frame_interval(),
    );
    station.run().await?;

    if let Some(mut listener) = hotkey_listener {
        listener.stop();
    }
    drop(touch_device);
    if !producer.is_running() {
        warn!("Video producer had already stopped; check the source status above");
    }
    producer.stop();

    info!("Station stopped");
    Ok(())
}

//! Controller task
//!
//! The single context that owns the [`SessionController`]. It ticks the
//! recognizer, drains the trigger queue, runs console commands and watches
//! the camera status until the operator quits or Ctrl-C arrives.

mod console;
mod presenter;

pub(crate) use console::spawn_stdin_reader;
pub(crate) use presenter::{describe_trigger_sources, spawn_presenter};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::export::{self, Exporter};
use crate::preferences::{self, PreferenceKey};
use crate::session::{SessionController, TriggerEvent, TriggerSource};
use crate::video::SourceStatus;
use console::{Command, ConsoleParser, Input, HELP};
use presenter::{describe_rejection, describe_status, render_grid, scanning_hint};

/// Whether the loop keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub(crate) struct Station {
    controller: SessionController,
    exporter: Arc<Exporter>,
    triggers: mpsc::Receiver<TriggerEvent>,
    commands: mpsc::Receiver<String>,
    status: watch::Receiver<SourceStatus>,
    parser: ConsoleParser,
    tick_interval: Duration,
}

impl Station {
    pub fn new(
        controller: SessionController,
        exporter: Arc<Exporter>,
        triggers: mpsc::Receiver<TriggerEvent>,
        commands: mpsc::Receiver<String>,
        status: watch::Receiver<SourceStatus>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            controller,
            exporter,
            triggers,
            commands,
            status,
            parser: ConsoleParser::new(),
            tick_interval,
        }
    }

    /// Run until quit, Ctrl-C, or every input source has closed
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut commands_open = true;
        let mut status_open = true;

        print!("{}", render_grid(&self.controller.snapshot()));
        if let Some(hint) = scanning_hint(self.controller.state(), self.controller.recognizer_available()) {
            println!("{}", hint);
        }

        loop {
            tokio::select! {
                _ = tick.tick() => self.poll_recognition(),
                Some(event) = self.triggers.recv() => self.handle_trigger(&event),
                line = self.commands.recv(), if commands_open => match line {
                    Some(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        debug!("Console input closed");
                        commands_open = false;
                    }
                },
                changed = self.status.changed(), if status_open => match changed {
                    Ok(()) => {
                        let status = self.status.borrow_and_update().clone();
                        info!(%status, "Video source status changed");
                        println!("{}", describe_status(&status));
                    }
                    Err(_) => status_open = false,
                },
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("Interrupted; shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    fn poll_recognition(&mut self) {
        if let Err(e) = self.controller.poll_recognition(Instant::now()) {
            warn!("Could not open session for scanned code: {}", e);
            println!("{}", describe_rejection(&e));
        }
    }

    fn handle_trigger(&mut self, event: &TriggerEvent) {
        // Captures are reported through SlotFilled events
        if let Err(e) = self.controller.handle_trigger(event) {
            debug!(source = %event.source, "Trigger rejected: {}", e);
            println!("{}", describe_rejection(&e));
        }
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        match self.parser.feed(line) {
            Input::Run(command) => return self.run_command(command),
            Input::Confirm(prompt) => println!("{}", prompt),
            Input::Cancelled => println!("Cancelled"),
            Input::Invalid(message) => println!("{}", message),
            Input::Empty => {}
        }
        Flow::Continue
    }

    fn run_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Capture => self.handle_trigger(&TriggerEvent::now(TriggerSource::Button)),
            Command::Delete(index) => match self.controller.delete_slot(index) {
                Ok(true) => {}
                Ok(false) => println!("Slot {} is already empty", index + 1),
                Err(e) => println!("{}", describe_rejection(&e)),
            },
            Command::Reset => {
                self.controller.reset();
                if let Some(hint) = scanning_hint(self.controller.state(), self.controller.recognizer_available()) {
                    println!("{}", hint);
                }
            }
            Command::Export => self.export_now(),
            Command::Status => print!("{}", render_grid(&self.controller.snapshot())),
            Command::Identify(code) => {
                if let Err(e) = self.controller.identify(&code) {
                    println!("{}", describe_rejection(&e));
                }
            }
            Command::Set(key, value) => {
                match preferences::update_preference(key, value.as_deref()) {
                    Ok(_) => {
                        match &value {
                            Some(value) => println!("{} set to {}", key, value),
                            None => println!("{} cleared", key),
                        }
                        if matches!(key, PreferenceKey::Storage | PreferenceKey::Profile) {
                            println!("The new {} applies from the next start", key);
                        }
                    }
                    Err(e) => println!("Could not save preference: {}", e),
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Export the current session in the background
    fn export_now(&self) {
        if self.controller.identifier().is_none() {
            println!("No active session to export");
            return;
        }

        let (filled, total) = (self.controller.filled_count(), self.controller.total_slots());
        if filled < total {
            println!("Exporting incomplete session ({}/{} images)", filled, total);
        }

        let snapshot = self.controller.snapshot();
        let exporter = Arc::clone(&self.exporter);
        tokio::spawn(async move {
            match export::export_session(exporter, snapshot).await {
                Ok(outcome) => {
                    export::log_outcome(&outcome);
                    println!("Report saved to {}", outcome.report.display());
                }
                Err(e) => {
                    error!("Manual export failed: {:#}", e);
                    println!("Export failed: {:#}", e);
                }
            }
        });
    }
}

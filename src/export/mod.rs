//! Export pipeline
//!
//! Reacts to finished sessions: renders the report, optionally mails it and
//! opens it. Rendering and SMTP are blocking, so each export runs on the
//! blocking pool.

mod notify;
mod report;

pub(crate) use notify::{Notifier, SmtpCredentials, SmtpNotifier};
pub(crate) use report::{PdfReport, ReportGenerator, ReportMetadata};

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use crate::preferences::{self, Preferences};
use crate::session::{SessionEvent, SessionSnapshot};

/// What an export needs besides the session itself
#[derive(Debug, Clone)]
pub(crate) struct ExportRequest {
    pub metadata: ReportMetadata,
    pub recipient: Option<String>,
}

impl ExportRequest {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            metadata: ReportMetadata {
                inspector: prefs.inspector_or_default(),
                model: prefs.model_or_default(),
                generated_at: Local::now(),
            },
            recipient: prefs.recipient_email.clone(),
        }
    }
}

/// How the email step went
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    NoRecipient,
    NotConfigured,
    Sent(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub(crate) struct ExportOutcome {
    pub report: PathBuf,
    pub delivery: Delivery,
}

pub(crate) struct Exporter {
    report: Box<dyn ReportGenerator>,
    notifier: Option<Box<dyn Notifier>>,
    open_after_export: bool,
}

impl Exporter {
    pub fn new(
        report: Box<dyn ReportGenerator>,
        notifier: Option<Box<dyn Notifier>>,
        open_after_export: bool,
    ) -> Self {
        Self {
            report,
            notifier,
            open_after_export,
        }
    }

    /// Render and deliver one session. Blocking.
    ///
    /// A delivery failure is reported in the outcome, not as an error; only a
    /// failed report is fatal.
    pub fn export(&self, session: &SessionSnapshot, request: &ExportRequest) -> Result<ExportOutcome> {
        let report = self
            .report
            .generate(session, &request.metadata)
            .context("Failed to generate inspection report")?;

        let identifier = session.identifier.as_deref().unwrap_or_default();
        let delivery = match (&request.recipient, &self.notifier) {
            (None, _) => Delivery::NoRecipient,
            (Some(_), None) => Delivery::NotConfigured,
            (Some(recipient), Some(notifier)) => {
                match notifier.send(&report, recipient, identifier, &request.metadata) {
                    Ok(()) => Delivery::Sent(recipient.clone()),
                    Err(e) => {
                        error!(recipient = %recipient, "Failed to email report: {}", e);
                        Delivery::Failed(e.to_string())
                    }
                }
            }
        };

        if self.open_after_export {
            if let Err(e) = open::that(&report) {
                warn!(path = %report.display(), "Failed to open report: {}", e);
            }
        }

        Ok(ExportOutcome { report, delivery })
    }
}

/// Export `session` on the blocking pool using the current preferences
pub(crate) async fn export_session(
    exporter: Arc<Exporter>,
    session: SessionSnapshot,
) -> Result<ExportOutcome> {
    let request = ExportRequest::from_preferences(&preferences::load_preferences());
    tokio::task::spawn_blocking(move || exporter.export(&session, &request))
        .await
        .context("Export task panicked")?
}

/// Event handler loop that exports every completed session
#[tracing::instrument(skip_all)]
async fn run_export_handler(
    mut event_rx: broadcast::Receiver<SessionEvent>,
    exporter: Arc<Exporter>,
) {
    loop {
        match event_rx.recv().await {
            Ok(SessionEvent::Completed(session)) => {
                let identifier = session.identifier.clone().unwrap_or_default();
                info!(identifier = %identifier, "Session complete; exporting report");
                match export_session(Arc::clone(&exporter), session).await {
                    Ok(outcome) => log_outcome(&outcome),
                    Err(e) => error!(identifier = %identifier, "Export failed: {:#}", e),
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Export handler fell behind on session events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Spawn the export handler task
pub(crate) fn spawn_export_handler(
    event_rx: broadcast::Receiver<SessionEvent>,
    exporter: Arc<Exporter>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_export_handler(event_rx, exporter))
}

pub(crate) fn log_outcome(outcome: &ExportOutcome) {
    info!(path = %outcome.report.display(), "Report exported");
    match &outcome.delivery {
        Delivery::Sent(recipient) => info!(recipient = %recipient, "Report emailed"),
        Delivery::Failed(reason) => warn!("Report not emailed: {}", reason),
        Delivery::NotConfigured => {
            info!("Recipient set but SMTP credentials missing; report not emailed")
        }
        Delivery::NoRecipient => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use super::notify::NotifyError;
    use std::path::Path;
    use std::sync::Mutex;

    struct FileReport {
        dir: PathBuf,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ReportGenerator for FileReport {
        fn generate(&self, session: &SessionSnapshot, _metadata: &ReportMetadata) -> Result<PathBuf> {
            let identifier = session.identifier.clone().context("no identifier")?;
            let path = self.dir.join(format!("{}_Report.pdf", identifier));
            std::fs::write(&path, b"%PDF")?;
            self.calls.lock().unwrap().push(identifier);
            Ok(path)
        }
    }

    struct RecordingNotifier {
        fail: bool,
        sent: Arc<Mutex<Vec<(PathBuf, String)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(
            &self,
            document: &Path,
            recipient: &str,
            _identifier: &str,
            _metadata: &ReportMetadata,
        ) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::ContentType("relay refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((document.to_path_buf(), recipient.to_string()));
            Ok(())
        }
    }

    fn snapshot(identifier: &str) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Complete,
            identifier: Some(identifier.to_string()),
            location: None,
            filled: 2,
            total: 2,
            slots: Vec::new(),
        }
    }

    fn request(recipient: Option<&str>) -> ExportRequest {
        ExportRequest {
            metadata: ReportMetadata {
                inspector: "N/A".into(),
                model: "N/A".into(),
                generated_at: Local::now(),
            },
            recipient: recipient.map(str::to_string),
        }
    }

    fn exporter(
        dir: &Path,
        notifier: Option<RecordingNotifier>,
    ) -> (Exporter, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let report = FileReport {
            dir: dir.to_path_buf(),
            calls: Arc::clone(&calls),
        };
        let notifier = notifier.map(|n| Box::new(n) as Box<dyn Notifier>);
        (Exporter::new(Box::new(report), notifier, false), calls)
    }

    #[test]
    fn test_export_without_recipient() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (exporter, calls) = exporter(dir.path(), None);

        let outcome = exporter.export(&snapshot("ABC123"), &request(None)).unwrap();
        assert_eq!(outcome.delivery, Delivery::NoRecipient);
        assert!(outcome.report.ends_with("ABC123_Report.pdf"));
        assert_eq!(*calls.lock().unwrap(), vec!["ABC123".to_string()]);
    }

    #[test]
    fn test_export_emails_recipient() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let sent = Arc::new(Mutex::new(Vec::new()));
        let notifier = RecordingNotifier {
            fail: false,
            sent: Arc::clone(&sent),
        };
        let (exporter, _) = exporter(dir.path(), Some(notifier));

        let outcome = exporter
            .export(&snapshot("X"), &request(Some("qa@example.com")))
            .unwrap();
        assert_eq!(outcome.delivery, Delivery::Sent("qa@example.com".into()));
        assert_eq!(sent.lock().unwrap()[0].1, "qa@example.com");
    }

    #[test]
    fn test_delivery_failure_is_not_fatal() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let notifier = RecordingNotifier {
            fail: true,
            sent: Arc::default(),
        };
        let (exporter, _) = exporter(dir.path(), Some(notifier));

        let outcome = exporter
            .export(&snapshot("X"), &request(Some("qa@example.com")))
            .unwrap();
        assert!(matches!(outcome.delivery, Delivery::Failed(_)));
        assert!(outcome.report.exists());
    }

    #[test]
    fn test_recipient_without_smtp() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (exporter, _) = exporter(dir.path(), None);
        let outcome = exporter
            .export(&snapshot("X"), &request(Some("qa@example.com")))
            .unwrap();
        assert_eq!(outcome.delivery, Delivery::NotConfigured);
    }

    #[test]
    fn test_report_failure_is_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (exporter, _) = exporter(dir.path(), None);
        let mut session = snapshot("X");
        session.identifier = None;
        assert!(exporter.export(&session, &request(None)).is_err());
    }

    #[tokio::test]
    async fn test_handler_exports_on_completed_only() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (exporter, calls) = exporter(dir.path(), None);
        let (tx, rx) = broadcast::channel(16);
        let handle = spawn_export_handler(rx, Arc::new(exporter));

        tx.send(SessionEvent::Reset).unwrap();
        tx.send(SessionEvent::Completed(snapshot("DONE"))).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["DONE".to_string()]);
    }
}

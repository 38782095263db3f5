//! Report delivery by email
//!
//! Sends the finished report through an SMTP relay with STARTTLS. Credentials
//! come from the environment (`SMTP_USERNAME`, `SMTP_PASSWORD`, optional
//! `SMTP_FROM`), typically via a `.env` file.

use std::fs;
use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, instrument};
use zeroize::Zeroize;

use super::report::ReportMetadata;
use crate::config::SmtpConfig;

const USERNAME_VAR: &str = "SMTP_USERNAME";
const PASSWORD_VAR: &str = "SMTP_PASSWORD";
const FROM_VAR: &str = "SMTP_FROM";

#[derive(Debug, thiserror::Error)]
pub(crate) enum NotifyError {
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid content type: {0}")]
    ContentType(String),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Delivers a finished report to a recipient
pub(crate) trait Notifier: Send + Sync {
    fn send(
        &self,
        document: &Path,
        recipient: &str,
        identifier: &str,
        metadata: &ReportMetadata,
    ) -> Result<(), NotifyError>;
}

/// SMTP account used to send reports
pub(crate) struct SmtpCredentials {
    username: String,
    password: String,
    from: String,
}

impl SmtpCredentials {
    pub fn new(username: String, password: String, from: Option<String>) -> Self {
        let from = from.unwrap_or_else(|| username.clone());
        Self {
            username,
            password,
            from,
        }
    }

    /// Read credentials from the environment; `None` when not configured
    pub fn from_env() -> Option<Self> {
        let username = std::env::var(USERNAME_VAR).ok().filter(|v| !v.is_empty())?;
        let password = std::env::var(PASSWORD_VAR).ok().filter(|v| !v.is_empty())?;
        let from = std::env::var(FROM_VAR).ok().filter(|v| !v.is_empty());
        Some(Self::new(username, password, from))
    }
}

impl SmtpCredentials {
    /// Move the login into lettre's `Credentials`, leaving no copy of the
    /// password behind in `self`
    fn take_login(&mut self) -> Credentials {
        Credentials::new(
            std::mem::take(&mut self.username),
            std::mem::take(&mut self.password),
        )
    }
}

impl Drop for SmtpCredentials {
    fn drop(&mut self) {
        // Clear password from memory
        self.password.zeroize();
    }
}

/// `Inspection report {identifier}`
pub(crate) fn subject_for(identifier: &str) -> String {
    format!("Inspection report {}", identifier)
}

fn body_for(identifier: &str, metadata: &ReportMetadata) -> String {
    format!(
        "Inspection report for unit {}.\n\nModel: {}\nInspector: {}\nGenerated: {}\n\nThe report is attached as a PDF.\n",
        identifier,
        metadata.model,
        metadata.inspector,
        metadata.generated_at.format("%Y-%m-%d %H:%M"),
    )
}

/// Assemble the report email with the PDF attached
pub(crate) fn build_message(
    from: &str,
    recipient: &str,
    document: &Path,
    identifier: &str,
    metadata: &ReportMetadata,
) -> Result<Message, NotifyError> {
    let from: Mailbox = from.parse()?;
    let to: Mailbox = recipient.parse()?;

    let contents = fs::read(document).map_err(|e| NotifyError::Attachment {
        path: document.to_path_buf(),
        source: e,
    })?;
    let file_name = document
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("report.pdf")
        .to_string();
    let content_type = ContentType::parse("application/pdf")
        .map_err(|e| NotifyError::ContentType(e.to_string()))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject_for(identifier))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body_for(identifier, metadata)))
                .singlepart(Attachment::new(file_name).body(contents, content_type)),
        )?;
    Ok(message)
}

/// [`Notifier`] over an SMTP relay
pub(crate) struct SmtpNotifier {
    server: String,
    from: String,
    mailer: SmtpTransport,
}

impl SmtpNotifier {
    /// Build the relay transport once; the password lives only inside it
    pub fn new(settings: &SmtpConfig, mut credentials: SmtpCredentials) -> Result<Self, NotifyError> {
        let mailer = SmtpTransport::starttls_relay(&settings.server)?
            .port(settings.port)
            .credentials(credentials.take_login())
            .build();

        Ok(Self {
            server: settings.server.clone(),
            from: std::mem::take(&mut credentials.from),
            mailer,
        })
    }
}

impl Notifier for SmtpNotifier {
    #[instrument(skip(self, metadata), fields(server = %self.server))]
    fn send(
        &self,
        document: &Path,
        recipient: &str,
        identifier: &str,
        metadata: &ReportMetadata,
    ) -> Result<(), NotifyError> {
        let message = build_message(&self.from, recipient, document, identifier, metadata)?;

        self.mailer.send(&message)?;
        info!(recipient, identifier, "Report emailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            inspector: "Linh".into(),
            model: "SK-9".into(),
            generated_at: Local::now(),
        }
    }

    #[test]
    fn test_build_message_attaches_pdf() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let document = dir.path().join("ABC123_Report.pdf");
        fs::write(&document, b"%PDF-1.4 test").unwrap();

        let message = build_message(
            "station@example.com",
            "qa@example.com",
            &document,
            "ABC123",
            &metadata(),
        )
        .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Inspection report ABC123"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("ABC123_Report.pdf"));
        assert!(raw.contains("To: qa@example.com"));
    }

    #[test]
    fn test_invalid_recipient() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let document = dir.path().join("r.pdf");
        fs::write(&document, b"%PDF").unwrap();

        let err = build_message("station@example.com", "not an address", &document, "X", &metadata())
            .unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }

    #[test]
    fn test_missing_attachment() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = build_message(
            "station@example.com",
            "qa@example.com",
            &dir.path().join("missing.pdf"),
            "X",
            &metadata(),
        )
        .unwrap_err();
        assert!(matches!(err, NotifyError::Attachment { .. }));
    }

    #[test]
    fn test_from_defaults_to_username() {
        let credentials = SmtpCredentials::new("station@example.com".into(), "secret".into(), None);
        assert_eq!(credentials.from, "station@example.com");
        assert_eq!(subject_for("U-1"), "Inspection report U-1");
    }

    #[test]
    fn test_login_moves_password_out() {
        let mut credentials =
            SmtpCredentials::new("station@example.com".into(), "secret".into(), None);
        let _login = credentials.take_login();

        assert!(credentials.password.is_empty());
        assert!(credentials.username.is_empty());
        assert_eq!(credentials.from, "station@example.com");
    }

    #[test]
    fn test_notifier_keeps_sender() {
        let settings = SmtpConfig::default();
        let credentials = SmtpCredentials::new(
            "station@example.com".into(),
            "secret".into(),
            Some("reports@example.com".into()),
        );
        let notifier = SmtpNotifier::new(&settings, credentials).unwrap();
        assert_eq!(notifier.from, "reports@example.com");
        assert_eq!(notifier.server, settings.server);
    }
}

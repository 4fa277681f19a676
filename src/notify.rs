//! Digest delivery
//!
//! The notifier builds a plain-text message addressed from the mail account
//! to the configured recipient and hands it to a transport. Every failure here
//! is fatal for the run; there is no partial send.

use crate::credentials::MailCredentials;
use crate::digest::SelectionMode;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use thiserror::Error;

/// Errors delivering a digest
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid mail address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// A composed digest ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMail {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Subject line for the digest
///
/// # Example
/// ```
/// use perfdigest::digest::SelectionMode;
/// use perfdigest::notify::subject_line;
///
/// assert_eq!(
///     subject_line(SelectionMode::Threshold(11.0), "hunter"),
///     "The most significant (+/- 11%) performance regressions detected by hunter"
/// );
/// ```
pub fn subject_line(mode: SelectionMode, detector: &str) -> String {
    match mode {
        SelectionMode::Threshold(threshold) => format!(
            "The most significant (+/- {threshold}%) performance regressions detected by {detector}"
        ),
        SelectionMode::AllRegressions => {
            format!("All performance regressions detected by {detector}")
        }
    }
}

/// Delivers a digest mail
pub trait DigestTransport {
    fn deliver(&self, mail: &DigestMail, credentials: &MailCredentials) -> Result<(), NotifyError>;
}

/// Send `body` under `subject` to `recipient` from the credentialed account
pub fn send(
    transport: &dyn DigestTransport,
    subject: &str,
    body: &str,
    recipient: &str,
    credentials: &MailCredentials,
) -> Result<DigestMail, NotifyError> {
    let mail = DigestMail {
        subject: subject.to_string(),
        from: credentials.username.clone(),
        to: recipient.to_string(),
        body: body.to_string(),
    };
    transport.deliver(&mail, credentials)?;
    tracing::info!("Sent '{}' to {}", mail.subject, mail.to);
    Ok(mail)
}

fn mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Check that a digest from `from` to `to` can be addressed
pub fn check_addresses(from: &str, to: &str) -> Result<(), NotifyError> {
    mailbox(from)?;
    mailbox(to)?;
    Ok(())
}

/// Build the RFC 5322 message for a digest
pub fn build_message(mail: &DigestMail) -> Result<Message, NotifyError> {
    Message::builder()
        .from(mailbox(&mail.from)?)
        .to(mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| NotifyError::Message(e.to_string()))
}

/// SMTP submission with STARTTLS
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl DigestTransport for SmtpMailer {
    fn deliver(&self, mail: &DigestMail, credentials: &MailCredentials) -> Result<(), NotifyError> {
        let message = build_message(mail)?;
        let transport = SmtpTransport::starttls_relay(&self.host)
            .map_err(|e| NotifyError::Transport(format!("{}: {e}", self.host)))?
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .build();

        tracing::debug!("Submitting digest via {}:{}", self.host, self.port);
        transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| NotifyError::Transport(format!("{}:{}: {e}", self.host, self.port)))
    }
}

/// Prints the digest instead of sending it (dry runs)
#[derive(Debug, Clone, Default)]
pub struct StdoutTransport;

impl DigestTransport for StdoutTransport {
    fn deliver(&self, mail: &DigestMail, _credentials: &MailCredentials) -> Result<(), NotifyError> {
        println!("Subject: {}", mail.subject);
        println!("From: {}", mail.from);
        println!("To: {}", mail.to);
        println!();
        println!("{}", mail.body);
        Ok(())
    }
}

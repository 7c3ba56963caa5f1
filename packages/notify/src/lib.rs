#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Alert dispatch.
//!
//! Alerts are HTML emails sent over SMTP (any relay, including the SES SMTP
//! interface). Without recipients the dispatcher only logs what it would
//! have sent.

pub mod report;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub use report::Alert;

/// Default sender address.
pub const DEFAULT_FROM_ADDRESS: &str = "investigations.and.reporting@theguardian.com";

/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Errors that can occur while dispatching an alert.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A sender or recipient address is malformed.
    #[error("Invalid email address '{address}': {source}")]
    Address {
        /// The rejected address.
        address: String,
        /// Parse failure.
        source: lettre::address::AddressError,
    },

    /// The message could not be built.
    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP exchange failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Destination for rendered alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Sends one alert.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the alert could not be delivered.
    async fn send_alert(&self, subject: &str, body_html: &str) -> Result<(), NotifyError>;
}

/// Logs alerts instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl AlertSink for LogAlerter {
    async fn send_alert(&self, subject: &str, body_html: &str) -> Result<(), NotifyError> {
        log::info!(
            "No email addresses configured. Not sending an email but if I did it would look like this:"
        );
        log::info!("Subject: {subject}. Body: {body_html}");
        Ok(())
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host name.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Optional `(username, password)` pair.
    pub credentials: Option<(String, String)>,
}

/// Sends alerts as one HTML email to every recipient.
pub struct EmailAlerter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailAlerter {
    /// Creates an alerter for the given relay, sender and recipients.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Address`] for a malformed address and
    /// [`NotifyError::Smtp`] if the relay cannot be configured.
    pub fn new(
        settings: &SmtpSettings,
        from: &str,
        recipients: &[String],
    ) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port);

        if let Some((username, password)) = &settings.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
            recipients: recipients
                .iter()
                .map(|address| parse_mailbox(address))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Builds the message for one alert.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Message`] if the message cannot be built.
    pub fn build_message(&self, subject: &str, body_html: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        Ok(builder
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())?)
    }
}

#[async_trait]
impl AlertSink for EmailAlerter {
    async fn send_alert(&self, subject: &str, body_html: &str) -> Result<(), NotifyError> {
        if self.recipients.is_empty() {
            return LogAlerter.send_alert(subject, body_html).await;
        }

        let addresses = self
            .recipients
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        log::info!("Email {addresses}. Subject: {subject}. Body: {body_html}");

        let message = self.build_message(subject, body_html)?;
        self.transport.send(message).await?;

        log::info!("Email sent successfully");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.trim().parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

/// Splits a comma-separated recipient list, dropping blank entries.
#[must_use]
pub fn parse_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

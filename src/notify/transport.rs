//! Mail transports.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::error::TransportError;

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers a single message. Each call is independent; no state carries
/// over between calls.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;

    /// False when the transport can never deliver (missing credentials).
    fn is_configured(&self) -> bool {
        true
    }

    /// Check connectivity and authentication without sending.
    async fn verify(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// STARTTLS SMTP relay with username/password authentication.
///
/// Built without connection pooling: every send opens its own session.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        if !config.has_credentials() {
            return Err(TransportError::NotConfigured);
        }

        let from = parse_mailbox(&config.from_email)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| TransportError::Smtp(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&mail.to)?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| TransportError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Smtp(e.to_string()))
    }

    async fn verify(&self) -> Result<(), TransportError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Smtp("connection test rejected".to_string())),
            Err(e) => Err(TransportError::Smtp(e.to_string())),
        }
    }
}

/// Stand-in used when no credentials are configured; never delivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransport;

#[async_trait]
impl MailTransport for DisabledTransport {
    async fn send(&self, _mail: &OutgoingMail) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn verify(&self) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured)
    }
}

/// SMTP transport from config, or the disabled transport when it cannot be built.
pub fn build_transport(config: &SmtpConfig) -> Arc<dyn MailTransport> {
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Mail credentials incomplete, notifications disabled");
        return Arc::new(DisabledTransport);
    }

    match SmtpMailer::from_config(config) {
        Ok(mailer) => {
            tracing::info!(server = %config.server, port = config.port, "SMTP transport configured");
            Arc::new(mailer)
        }
        Err(e) => {
            tracing::warn!(error = %e, "SMTP transport unusable, notifications disabled");
            Arc::new(DisabledTransport)
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

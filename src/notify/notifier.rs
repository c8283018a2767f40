//! Retrying notifier behind the shared mail breaker.

use std::sync::Arc;
use std::time::Duration;

use crate::config::WatcherConfig;
use crate::error::TransportError;
use crate::notify::transport::{MailTransport, OutgoingMail};
use crate::observability::EngineMetrics;
use crate::resilience::{BreakerSettings, CircuitBreaker, CircuitState, RetryPolicy};

/// Sends notifications; failure is reported as `false`, never as an error.
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    metrics: Arc<EngineMetrics>,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        breaker_settings: BreakerSettings,
        policy: RetryPolicy,
        attempt_timeout: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            transport,
            breaker: CircuitBreaker::new("email", breaker_settings, metrics.clone()),
            policy,
            attempt_timeout,
            metrics,
        }
    }

    pub fn from_config(
        transport: Arc<dyn MailTransport>,
        config: &WatcherConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self::new(
            transport,
            BreakerSettings::email(&config.breakers),
            RetryPolicy::from_config(&config.smtp),
            Duration::from_secs(config.smtp.timeout_secs),
            metrics,
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_configured()
    }

    /// Deliver one message. Counts exactly one sent or failed email.
    pub async fn notify(&self, recipient: &str, subject: &str, body: &str) -> bool {
        let sent = self.deliver(recipient, subject, body).await;
        self.metrics.record_email(sent);
        sent
    }

    async fn deliver(&self, recipient: &str, subject: &str, body: &str) -> bool {
        if !self.transport.is_configured() {
            tracing::warn!(recipient = %recipient, "Mail transport not configured, notification dropped");
            return false;
        }

        let mail = OutgoingMail {
            to: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };

        for attempt in 0..self.policy.max_attempts {
            let permit = match self.breaker.try_acquire() {
                Ok(permit) => permit,
                Err(open) => {
                    tracing::warn!(recipient = %recipient, error = %open, "Mail breaker open, not sending");
                    return false;
                }
            };

            let sent = tokio::time::timeout(self.attempt_timeout, self.transport.send(&mail))
                .await
                .unwrap_or(Err(TransportError::Timeout(self.attempt_timeout)));

            match sent {
                Ok(()) => {
                    permit.success();
                    tracing::info!(recipient = %recipient, attempt = attempt + 1, "Notification sent");
                    return true;
                }
                Err(e) if e.is_permanent() => {
                    drop(permit);
                    tracing::error!(recipient = %recipient, error = %e, "Notification cannot be delivered");
                    return false;
                }
                Err(e) => {
                    permit.failure();
                    tracing::error!(recipient = %recipient, attempt = attempt + 1, error = %e, "Notification attempt failed");
                }
            }

            if self.breaker.state() == CircuitState::Open {
                tracing::warn!(recipient = %recipient, "Mail breaker opened, giving up");
                return false;
            }
            if let Some(delay) = self.policy.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        false
    }

    /// Check the transport at startup; logs the outcome.
    pub async fn verify(&self) -> bool {
        match tokio::time::timeout(self.attempt_timeout, self.transport.verify()).await {
            Ok(Ok(())) => {
                tracing::info!("Mail transport verified");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Mail transport verification failed");
                false
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.attempt_timeout, "Mail transport verification timed out");
                false
            }
        }
    }
}

//! Outbound notifications for newly stored transactions

use async_trait::async_trait;
use ietrack_common::config::NotifyConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Notification channel; delivery failures are reported, never raised
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the message was handed off
    async fn send(&self, subject: &str, html: &str) -> bool;
}

/// Writes the subject to the log; used when no relay is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, html: &str) -> bool {
        info!(subject, body_bytes = html.len(), "Notification (no relay configured)");
        true
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay
pub struct MailRelayNotifier {
    http_client: reqwest::Client,
    relay_url: String,
    token: Option<String>,
    from: String,
    recipients: Vec<String>,
}

impl MailRelayNotifier {
    pub fn new(
        relay_url: String,
        token: Option<String>,
        from: String,
        recipients: Vec<String>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            relay_url,
            token,
            from,
            recipients,
        })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send(&self, subject: &str, html: &str) -> bool {
        if self.recipients.is_empty() {
            warn!(subject, "Mail relay has no recipients, skipping");
            return false;
        }

        let message = RelayMessage {
            from: &self.from,
            to: &self.recipients,
            subject,
            html,
        };

        let mut request = self.http_client.post(&self.relay_url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(subject, recipients = self.recipients.len(), "Notification sent");
                true
            }
            Ok(response) => {
                warn!(subject, status = response.status().as_u16(), "Mail relay rejected notification");
                false
            }
            Err(e) => {
                warn!(subject, error = %e, "Mail relay unreachable");
                false
            }
        }
    }
}

/// Relay notifier when a relay URL is configured, log notifier otherwise
pub fn from_config(config: &NotifyConfig) -> Box<dyn Notifier> {
    let Some(relay_url) = config.relay_url.clone() else {
        return Box::new(LogNotifier);
    };

    let from = config
        .from
        .clone()
        .unwrap_or_else(|| "ietrack@localhost".to_string());

    match MailRelayNotifier::new(
        relay_url,
        config.relay_token.clone(),
        from,
        config.recipients.clone(),
    ) {
        Ok(notifier) => Box::new(notifier),
        Err(e) => {
            warn!(error = %e, "Could not build mail relay client, notifications will only be logged");
            Box::new(LogNotifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("subject", "<p>x</p>").await);
    }

    #[tokio::test]
    async fn test_relay_without_recipients_reports_failure() {
        let notifier =
            MailRelayNotifier::new("http://127.0.0.1:1/send".into(), None, "a@b".into(), vec![])
                .unwrap();
        assert!(!notifier.send("subject", "body").await);
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_swallowed() {
        let notifier = MailRelayNotifier::new(
            "http://127.0.0.1:1/send".into(),
            Some("t".into()),
            "a@b".into(),
            vec!["c@d".into()],
        )
        .unwrap();
        assert!(!notifier.send("subject", "body").await);
    }

    #[test]
    fn test_relay_message_shape() {
        let to = vec!["x@y".to_string()];
        let message = RelayMessage {
            from: "a@b",
            to: &to,
            subject: "s",
            html: "<p/>",
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"from": "a@b", "to": ["x@y"], "subject": "s", "html": "<p/>"})
        );
    }
}

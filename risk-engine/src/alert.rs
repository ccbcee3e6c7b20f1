//! Alert delivery for circuit breaker trips
//!
//! Delivery is fire-and-forget: a sink that cannot deliver logs and
//! moves on. A failed alert must never block or fail the trip itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Circuit breaker trip notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripAlert {
    /// Trip reason
    pub reason: String,

    /// When the breaker opened
    pub opened_at: DateTime<Utc>,

    /// Rolling-window outflow at trip time
    pub window_total: Decimal,

    /// Rolling-window transaction count at trip time
    pub transaction_count: u32,

    /// Configured cooldown (minutes)
    pub cooldown_minutes: i64,
}

/// Alerting sink for breaker trips
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver the alert. Implementations swallow their own failures.
    async fn notify(&self, alert: &TripAlert);
}

/// Webhook sink posting the alert as JSON
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink").field("url", &self.url).finish()
    }
}

impl WebhookSink {
    /// Create a sink posting to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn notify(&self, alert: &TripAlert) {
        match self.client.post(&self.url).json(alert).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(reason = %alert.reason, "Trip alert delivered");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Trip alert webhook rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Trip alert webhook failed");
            }
        }
    }
}

/// Log-only sink (default when no webhook is configured)
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn notify(&self, alert: &TripAlert) {
        tracing::error!(
            reason = %alert.reason,
            window_total = %alert.window_total,
            transaction_count = alert.transaction_count,
            cooldown_minutes = alert.cooldown_minutes,
            "Circuit breaker tripped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        let sink = LogSink;
        let alert = TripAlert {
            reason: "window amount exceeded".to_string(),
            opened_at: Utc::now(),
            window_total: Decimal::from(600),
            transaction_count: 4,
            cooldown_minutes: 30,
        };
        sink.notify(&alert).await;
    }

    #[tokio::test]
    async fn test_webhook_failure_swallowed() {
        // Nothing listens here; delivery must fail silently
        let sink = WebhookSink::new("http://127.0.0.1:1/alerts");
        let alert = TripAlert {
            reason: "transaction rate exceeded".to_string(),
            opened_at: Utc::now(),
            window_total: Decimal::ZERO,
            transaction_count: 1000,
            cooldown_minutes: 30,
        };
        sink.notify(&alert).await;
    }
}

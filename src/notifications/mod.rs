//! Outbound alert delivery.
//!
//! Low-stock alerts are written to the notification outbox in the same database
//! transaction as the stock change; the outbox worker later hands each row to the
//! [`NotificationDispatcher`], which routes it to the channel the business chose.

pub mod channels;
pub mod outbox;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;
use crate::entities::stock_alert::AlertChannel;

pub use channels::{HttpNotificationChannel, LogNotificationChannel};

/// A message ready to leave the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: AlertChannel,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid notification configuration: {0}")]
    Config(String),
}

/// A delivery transport. Implementations must be safe to call concurrently.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError>;
}

/// Routes messages to the transport registered for their channel.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Arc<dyn NotificationChannel>,
    sms: Arc<dyn NotificationChannel>,
    whatsapp: Arc<dyn NotificationChannel>,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn NotificationChannel>,
        sms: Arc<dyn NotificationChannel>,
        whatsapp: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            email,
            sms,
            whatsapp,
        }
    }

    /// Every channel only logs. Used when no provider is configured.
    pub fn log_only() -> Self {
        let log: Arc<dyn NotificationChannel> = Arc::new(LogNotificationChannel);
        Self::new(log.clone(), log.clone(), log)
    }

    /// Builds HTTP transports for configured endpoints and falls back to logging
    /// for the rest. SMS and WhatsApp share the SMS provider endpoint.
    pub fn from_config(config: &AppConfig) -> Result<Self, NotificationError> {
        let log: Arc<dyn NotificationChannel> = Arc::new(LogNotificationChannel);

        let email: Arc<dyn NotificationChannel> = match config.notify_email_endpoint.as_deref() {
            Some(endpoint) => Arc::new(HttpNotificationChannel::new(
                "email",
                endpoint,
                config.notify_api_key.clone(),
                config.notify_sender.clone(),
            )?),
            None => log.clone(),
        };

        let (sms, whatsapp): (Arc<dyn NotificationChannel>, Arc<dyn NotificationChannel>) =
            match config.notify_sms_endpoint.as_deref() {
                Some(endpoint) => (
                    Arc::new(HttpNotificationChannel::new(
                        "sms",
                        endpoint,
                        config.notify_api_key.clone(),
                        config.notify_sender.clone(),
                    )?),
                    Arc::new(HttpNotificationChannel::new(
                        "whatsapp",
                        endpoint,
                        config.notify_api_key.clone(),
                        config.notify_sender.clone(),
                    )?),
                ),
                None => (log.clone(), log),
            };

        info!(
            email = email.name(),
            sms = sms.name(),
            whatsapp = whatsapp.name(),
            "Notification transports configured"
        );
        Ok(Self::new(email, sms, whatsapp))
    }

    pub fn channel(&self, channel: AlertChannel) -> &Arc<dyn NotificationChannel> {
        match channel {
            AlertChannel::Email => &self.email,
            AlertChannel::Sms => &self.sms,
            AlertChannel::Whatsapp => &self.whatsapp,
        }
    }

    pub async fn dispatch(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        self.channel(message.channel).send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_channels_fall_back_to_logging() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        let dispatcher = NotificationDispatcher::from_config(&cfg).unwrap();
        assert_eq!(dispatcher.channel(AlertChannel::Email).name(), "log");
        assert_eq!(dispatcher.channel(AlertChannel::Whatsapp).name(), "log");
    }

    #[test]
    fn configured_endpoints_use_http() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        cfg.notify_sms_endpoint = Some("http://127.0.0.1:9/sms".into());
        let dispatcher = NotificationDispatcher::from_config(&cfg).unwrap();
        assert_eq!(dispatcher.channel(AlertChannel::Email).name(), "log");
        assert_eq!(dispatcher.channel(AlertChannel::Sms).name(), "sms");
        assert_eq!(dispatcher.channel(AlertChannel::Whatsapp).name(), "whatsapp");
    }

    #[tokio::test]
    async fn log_only_dispatch_succeeds() {
        let dispatcher = NotificationDispatcher::log_only();
        let message = OutboundMessage {
            channel: AlertChannel::Sms,
            to: "+15550100".into(),
            subject: "Low stock".into(),
            body: "Milk is low".into(),
        };
        assert!(dispatcher.dispatch(&message).await.is_ok());
    }
}

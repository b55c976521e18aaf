use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{NotificationChannel, NotificationError, OutboundMessage};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts messages as JSON to a provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotificationChannel {
    name: &'static str,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    sender: String,
}

impl HttpNotificationChannel {
    pub fn new(
        name: &'static str,
        endpoint: &str,
        api_key: Option<String>,
        sender: String,
    ) -> Result<Self, NotificationError> {
        if endpoint.trim().is_empty() {
            return Err(NotificationError::Config(format!(
                "{} endpoint must not be empty",
                name
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self {
            name,
            client,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            sender,
        })
    }
}

#[async_trait]
impl NotificationChannel for HttpNotificationChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    #[instrument(skip(self, message), fields(channel = self.name, to = %message.to))]
    async fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        let payload = json!({
            "channel": message.channel,
            "from": self.sender,
            "to": message.to,
            "subject": message.subject,
            "body": message.body,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            info!("Notification delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Notification provider rejected message");
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Writes the message to the log and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationChannel;

#[async_trait]
impl NotificationChannel for LogNotificationChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        info!(
            channel = %message.channel,
            to = %message.to,
            subject = %message.subject,
            "Notification (log only): {}",
            message.body
        );
        debug!("No provider configured for {} alerts", message.channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stock_alert::AlertChannel;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> OutboundMessage {
        OutboundMessage {
            channel: AlertChannel::Email,
            to: "owner@corner.shop".into(),
            subject: "Low stock: Oat Milk".into(),
            body: "Oat Milk (SKU OAT-1) has 2 units remaining".into(),
        }
    }

    #[tokio::test]
    async fn posts_json_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "channel": "email",
                "from": "alerts@test.local",
                "to": "owner@corner.shop"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let channel = HttpNotificationChannel::new(
            "email",
            &format!("{}/send", server.uri()),
            Some("secret".into()),
            "alerts@test.local".into(),
        )
        .unwrap();

        channel.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let channel =
            HttpNotificationChannel::new("email", &server.uri(), None, "alerts@test.local".into())
                .unwrap();

        assert_matches!(
            channel.send(&message()).await,
            Err(NotificationError::Rejected { status: 503, ref body }) if body == "maintenance"
        );
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert_matches!(
            HttpNotificationChannel::new("sms", "  ", None, "x".into()),
            Err(NotificationError::Config(_))
        );
    }
}

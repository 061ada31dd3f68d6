use a2::{Client, DefaultNotificationBuilder, NotificationBuilder, NotificationOptions, Priority};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::models::NotificationPayload;

/// Delivery to a single device. Never fails: gateway errors are logged and
/// reported as `false` so the caller can count them and move on.
#[trait_variant::make(PushGateway: Send)]
pub trait LocalPushGateway {
    async fn send(&self, payload: &NotificationPayload) -> bool;
}

pub struct ApnsGateway {
    client: Client,
    topic: String,
}

impl ApnsGateway {
    pub fn new(
        key_path: &str,
        key_id: &str,
        team_id: &str,
        topic: &str,
        production: bool,
    ) -> Result<Self> {
        let key_path = Path::new(key_path);
        let key_file = std::fs::File::open(key_path).context(format!(
            "Failed to read APNs key file: {}",
            key_path.display()
        ))?;

        let config = a2::ClientConfig::new(if production {
            a2::Endpoint::Production
        } else {
            a2::Endpoint::Sandbox
        });

        let client = Client::token(key_file, key_id, team_id, config)
            .context("Failed to create APNs client")?;

        Ok(Self {
            client,
            topic: topic.to_string(),
        })
    }

    async fn deliver(&self, payload_data: &NotificationPayload) -> Result<u16> {
        let builder = DefaultNotificationBuilder::new()
            .set_title(&payload_data.title)
            .set_body(&payload_data.body)
            .set_sound("default");

        let mut payload = builder.build(
            &payload_data.device_token,
            NotificationOptions {
                apns_topic: Some(&self.topic),
                apns_priority: Some(Priority::High),
                apns_collapse_id: None,
                apns_expiration: None,
                apns_push_type: None,
                apns_id: None,
            },
        );

        for (key, value) in &payload_data.data {
            payload.add_custom_data(key, value)?;
        }

        let response = self.client.send(payload).await?;
        Ok(response.code)
    }
}

impl PushGateway for ApnsGateway {
    async fn send(&self, payload: &NotificationPayload) -> bool {
        debug!(
            device_token = %payload.device_token,
            title = %payload.title,
            "Attempting to send APNS notification"
        );

        match self.deliver(payload).await {
            Ok(code) if (200..300).contains(&code) => {
                info!(
                    notification_type = %payload.notification_type,
                    wallet = %payload.wallet,
                    status = code,
                    "Notification delivered successfully"
                );
                true
            }
            Ok(code) => {
                warn!(
                    notification_type = %payload.notification_type,
                    wallet = %payload.wallet,
                    status = code,
                    "Notification rejected by APNs"
                );
                false
            }
            Err(e) => {
                if let Some(a2::Error::ResponseError(resp)) = e.downcast_ref::<a2::Error>() {
                    if resp.code == 410 {
                        warn!(
                            wallet = %payload.wallet,
                            "Device token is no longer registered with APNs"
                        );
                    }
                }
                error!(
                    notification_type = %payload.notification_type,
                    wallet = %payload.wallet,
                    error = %e,
                    "Failed to send notification"
                );
                false
            }
        }
    }
}

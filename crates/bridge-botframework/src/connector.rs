//! Outbound activity delivery
//!
//! Replies are posted to the Bot Framework connector at the `serviceUrl` of
//! the inbound activity.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, error};

use crate::error::{ChannelError, Result};
use crate::types::Activity;

/// Anything that can deliver an activity back to the channel
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send(&self, activity: &Activity) -> Result<()>;
}

/// Bot Framework connector REST client
#[derive(Clone)]
pub struct ConnectorClient {
    client: Client,
}

impl ConnectorClient {
    /// Create a new connector client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ChannelError::Http)?;

        Ok(Self { client })
    }

    /// `{serviceUrl}/v3/conversations/{conversationId}/activities[/{replyToId}]`
    pub fn activity_url(activity: &Activity) -> Result<Url> {
        let service_url = activity
            .service_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ChannelError::InvalidActivity("missing serviceUrl".to_string()))?;
        let conversation_id = activity
            .conversation
            .as_ref()
            .map(|conversation| conversation.id.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ChannelError::InvalidActivity("missing conversation id".to_string()))?;

        let mut url = Url::parse(service_url).map_err(|e| {
            ChannelError::InvalidActivity(format!("invalid serviceUrl '{}': {}", service_url, e))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ChannelError::InvalidActivity(format!("serviceUrl cannot be a base: {}", service_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["v3", "conversations", conversation_id, "activities"]);
            if let Some(reply_to_id) = activity.reply_to_id.as_deref() {
                segments.push(reply_to_id);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl ActivitySender for ConnectorClient {
    async fn send(&self, activity: &Activity) -> Result<()> {
        let url = Self::activity_url(activity)?;

        debug!("Sending {} activity to {}", activity.activity_type, url);

        let response = self
            .client
            .post(url)
            .json(activity)
            .send()
            .await
            .map_err(ChannelError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Send activity failed: {} - {}", status, error_text);
            return Err(ChannelError::Connector(format!("{}: {}", status, error_text)));
        }

        Ok(())
    }
}

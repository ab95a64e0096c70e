use crate::error::NotifyError;
use crate::plugin::ChannelPlugin;
use crate::utils::{truncate_string, with_retries, MAX_BODY_LENGTH};
use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Posts `{"text": message}` to every configured URL, the payload shape
/// chat incoming-webhooks accept.
pub struct WebhookChannel {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl WebhookChannel {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls,
        }
    }

    async fn post_once(&self, url: &str, payload: &Value) -> Result<()> {
        let resp = self.client.post(url).json(payload).send().await.map_err(NotifyError::from)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("[Failed to read response body: {e}]"));
        Err(NotifyError::ApiError {
            service: "webhook".to_string(),
            status: status.as_u16(),
            body: truncate_string(&body, MAX_BODY_LENGTH),
        }
        .into())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, message: &str) -> Result<()> {
        let payload = serde_json::json!({ "text": message });
        let payload = &payload;
        let mut failed = 0usize;

        for url in &self.urls {
            if let Err(e) = with_retries("webhook", move || self.post_once(url, payload)).await {
                tracing::error!(url = %url, error = %format!("{e:#}"), "Webhook delivery failed");
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("webhook delivery failed for {failed} of {} urls", self.urls.len());
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    urls: Vec<String>,
}

fn parse_config(config: &Value) -> Result<WebhookConfig> {
    let cfg: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))?;
    if cfg.urls.is_empty() {
        return Err(NotifyError::InvalidConfig("webhook: urls must not be empty".to_string()).into());
    }
    Ok(cfg)
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(WebhookChannel::new(cfg.urls)))
    }
}

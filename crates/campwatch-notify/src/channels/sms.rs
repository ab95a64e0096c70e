use crate::error::NotifyError;
use crate::plugin::ChannelPlugin;
use crate::utils::{normalize_phone_number, truncate_string, with_retries, MAX_BODY_LENGTH};
use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct SmsChannel {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    phone_numbers: Vec<String>,
}

impl SmsChannel {
    /// Numbers are normalized once here; the gateway receives digits and
    /// a leading `+` only.
    pub fn new(gateway_url: &str, api_key: &str, phone_numbers: &[String]) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            api_key: api_key.to_string(),
            phone_numbers: phone_numbers.iter().map(|p| normalize_phone_number(p)).collect(),
        }
    }

    pub fn phone_numbers(&self) -> &[String] {
        &self.phone_numbers
    }

    async fn post_once(&self, payload: &Value) -> Result<()> {
        let resp = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(NotifyError::from)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::ApiError {
            service: "sms".to_string(),
            status: status.as_u16(),
            body: truncate_string(&body, MAX_BODY_LENGTH),
        }
        .into())
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    async fn send(&self, message: &str) -> Result<()> {
        let mut failed = 0usize;

        for phone in &self.phone_numbers {
            let payload = serde_json::json!({
                "to": phone,
                "message": message,
            });
            let payload = &payload;

            if let Err(e) = with_retries("sms", move || self.post_once(payload)).await {
                tracing::error!(phone = %phone, error = %format!("{e:#}"), "SMS delivery failed");
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("sms delivery failed for {failed} of {} numbers", self.phone_numbers.len());
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "sms"
    }
}

// Plugin

#[derive(Deserialize)]
struct SmsConfig {
    gateway_url: String,
    api_key: String,
    phone_numbers: Vec<String>,
}

fn parse_config(config: &Value) -> Result<SmsConfig> {
    let cfg: SmsConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("sms: {e}")))?;
    if cfg.phone_numbers.is_empty() {
        return Err(NotifyError::InvalidConfig("sms: phone_numbers must not be empty".to_string()).into());
    }
    Ok(cfg)
}

pub struct SmsPlugin;

impl ChannelPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(SmsChannel::new(
            &cfg.gateway_url,
            &cfg.api_key,
            &cfg.phone_numbers,
        )))
    }
}

use crate::channels::sms::SmsChannel;
use crate::error::NotifyError;
use crate::manager::{DeliveryReport, NotificationManager};
use crate::plugin::ChannelRegistry;
use crate::NotificationChannel;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

struct RecordingChannel {
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, message: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(&self, _message: &str) -> anyhow::Result<()> {
        anyhow::bail!("gateway down")
    }

    fn channel_name(&self) -> &str {
        "failing"
    }
}

// ── Plugin registry tests ──

#[test]
fn registry_default_has_all_builtin_plugins() {
    let registry = ChannelRegistry::default();
    let mut names = registry.plugin_names();
    names.sort();
    assert_eq!(names, vec!["log", "sms", "webhook"]);
}

#[test]
fn registry_unknown_plugin_returns_error() {
    let registry = ChannelRegistry::default();
    let result = registry.create_channel("email", &serde_json::json!({}));
    let err = result.err().expect("should return error for unknown plugin");
    assert!(matches!(
        err.downcast_ref::<NotifyError>(),
        Some(NotifyError::UnknownChannelType(name)) if name == "email"
    ));
}

#[test]
fn sms_plugin_validates_config() {
    let registry = ChannelRegistry::default();

    let valid = serde_json::json!({
        "gateway_url": "https://sms.example.com/send",
        "api_key": "key",
        "phone_numbers": ["+1 555-010-9999"]
    });
    let channel = registry.create_channel("sms", &valid).unwrap();
    assert_eq!(channel.channel_name(), "sms");

    let no_numbers = serde_json::json!({
        "gateway_url": "https://sms.example.com/send",
        "api_key": "key",
        "phone_numbers": []
    });
    let err = registry.create_channel("sms", &no_numbers).err().unwrap();
    assert!(matches!(err.downcast_ref::<NotifyError>(), Some(NotifyError::InvalidConfig(_))));

    let missing_key = serde_json::json!({"gateway_url": "https://sms.example.com/send"});
    assert!(registry.create_channel("sms", &missing_key).is_err());
}

#[test]
fn webhook_plugin_validates_config() {
    let registry = ChannelRegistry::default();
    assert!(registry
        .create_channel("webhook", &serde_json::json!({"urls": ["https://hooks.example.com/T1"]}))
        .is_ok());
    assert!(registry
        .create_channel("webhook", &serde_json::json!({"urls": []}))
        .is_err());
    assert!(registry
        .create_channel("webhook", &serde_json::json!({"url": "https://hooks.example.com/T1"}))
        .is_err());
}

#[test]
fn plugins_redact_secrets() {
    let registry = ChannelRegistry::default();
    let plugin = registry.get_plugin("sms").unwrap();
    let redacted = plugin.redact_config(&serde_json::json!({
        "gateway_url": "https://sms.example.com/send",
        "api_key": "key"
    }));
    assert_eq!(redacted["api_key"], "***");
    assert_eq!(redacted["gateway_url"], "https://sms.example.com/send");
}

#[test]
fn sms_channel_normalizes_numbers() {
    let channel = SmsChannel::new(
        "https://sms.example.com/send",
        "key",
        &["555-010 9999".to_string(), "+15550100000".to_string()],
    );
    assert_eq!(channel.phone_numbers(), ["5550109999", "+15550100000"]);
}

#[tokio::test]
async fn log_channel_always_succeeds() {
    let registry = ChannelRegistry::default();
    let channel = registry.create_channel("log", &serde_json::Value::Null).unwrap();
    assert!(channel.send("no-fill: check entities: 'E1'").await.is_ok());
}

// ── Manager tests ──

#[tokio::test]
async fn manager_delivers_in_order_to_every_channel() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let manager = NotificationManager::new(vec![
        Box::new(RecordingChannel { sent: first.clone() }),
        Box::new(RecordingChannel { sent: second.clone() }),
    ]);

    let messages = vec!["a: check entities: 'E1'".to_string(), "b: check entities: 'E2'".to_string()];
    let report = manager.notify_all(&messages).await;

    assert_eq!(
        report,
        DeliveryReport {
            messages: 2,
            delivered: 4,
            failed: 0
        }
    );
    assert_eq!(*first.lock().unwrap(), messages);
    assert_eq!(*second.lock().unwrap(), messages);
}

#[tokio::test]
async fn manager_continues_past_failing_channel() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let manager = NotificationManager::new(vec![
        Box::new(FailingChannel),
        Box::new(RecordingChannel { sent: sent.clone() }),
    ]);

    let report = manager.notify_all(&["m".to_string()]).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(*sent.lock().unwrap(), vec!["m".to_string()]);
}

#[tokio::test]
async fn manager_without_channels_delivers_nothing() {
    let manager = NotificationManager::new(Vec::new());
    let report = manager.notify_all(&["m".to_string()]).await;
    assert_eq!(report.messages, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 0);
}

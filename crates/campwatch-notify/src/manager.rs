use crate::NotificationChannel;

/// Outcome of delivering one cycle's messages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub messages: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Fans approved alert messages out to every channel.
///
/// Messages go out in the order given. A failing channel is logged and
/// does not stop delivery to the others.
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationManager {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub async fn notify(&self, message: &str) -> DeliveryReport {
        let mut report = DeliveryReport {
            messages: 1,
            ..Default::default()
        };
        for channel in &self.channels {
            match channel.send(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        channel = channel.channel_name(),
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }
        report
    }

    pub async fn notify_all(&self, messages: &[String]) -> DeliveryReport {
        let mut total = DeliveryReport::default();
        for message in messages {
            let report = self.notify(message).await;
            total.messages += report.messages;
            total.delivered += report.delivered;
            total.failed += report.failed;
        }
        total
    }

    pub fn channels(&self) -> &[Box<dyn NotificationChannel>] {
        &self.channels
    }
}

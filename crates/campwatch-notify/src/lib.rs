//! Notification delivery framework with pluggable channel support.
//!
//! Alert messages approved by the deduplicator are fanned out by the
//! [`manager::NotificationManager`] to every configured
//! [`NotificationChannel`]. Built-in channels are `log` (tracing only),
//! `webhook` (JSON POST) and `sms` (HTTP SMS gateway).

pub mod channels;
pub mod error;
pub mod manager;
pub mod plugin;
pub mod utils;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;

/// A notification delivery channel that sends alert messages to an external
/// service (e.g., webhook, SMS gateway).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers one alert message through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, message: &str) -> Result<()>;

    /// Returns the channel type name (e.g., `"sms"`, `"webhook"`).
    fn channel_name(&self) -> &str;
}

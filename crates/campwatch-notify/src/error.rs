/// Errors that can occur within the notification subsystem.
///
/// Channels and plugins return `anyhow::Result`; these variants are the
/// concrete causes wrapped inside it, so callers can downcast when they
/// need to tell configuration problems from delivery problems.
///
/// # Examples
///
/// ```rust
/// use campwatch_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing gateway_url".to_string());
/// assert!(err.to_string().contains("gateway_url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

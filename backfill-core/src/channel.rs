use async_trait::async_trait;
use backfill_domain::Channel;

/// What a provider hands back for an accepted message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReceipt {
    pub message_id: String,
    /// Provider already confirmed handset/mailbox delivery
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("hard bounce: {0}")]
    HardBounce(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Unavailable(_))
    }
}

/// SMS gateway or mail relay. All providers are interchangeable to the engine.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn send_message(
        &self,
        address: &str,
        channel: Channel,
        body: &str,
    ) -> Result<ProviderReceipt, ProviderError>;
}

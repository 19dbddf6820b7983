use async_trait::async_trait;
use backfill_core::{ChannelProvider, ProviderError, ProviderReceipt};
use backfill_domain::Channel;
use backfill_shared::pii::redact_contact;
use uuid::Uuid;

/// Stand-in gateway that writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProvider;

#[async_trait]
impl ChannelProvider for LoggingProvider {
    async fn send_message(
        &self,
        address: &str,
        channel: Channel,
        body: &str,
    ) -> Result<ProviderReceipt, ProviderError> {
        if address.trim().is_empty() {
            return Err(ProviderError::InvalidAddress("empty".to_string()));
        }
        let message_id = Uuid::new_v4().to_string();
        tracing::info!(
            to = %redact_contact(address),
            %channel,
            message_id = %message_id,
            chars = body.len(),
            "Message handed to log provider"
        );
        Ok(ProviderReceipt {
            message_id,
            delivered: false,
        })
    }
}

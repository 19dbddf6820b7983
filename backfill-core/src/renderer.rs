use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod templates {
    pub const CONFIRMATION_REQUEST: &str = "confirmation_request";
    pub const BOOKING_AUTO_CANCELLED: &str = "booking_auto_cancelled";
    pub const WAITLIST_OFFER: &str = "waitlist_offer";
    pub const WAITLIST_OFFER_LAPSED: &str = "waitlist_offer_lapsed";
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("missing variable {variable} for template {template}")]
    MissingVariable { template: String, variable: String },
}

/// Template content lives outside the engine; it only passes a key and variables.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_key: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, RenderError>;
}

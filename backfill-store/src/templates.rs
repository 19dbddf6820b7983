use async_trait::async_trait;
use backfill_core::renderer::templates;
use backfill_core::{RenderError, TemplateRenderer};
use std::collections::{BTreeMap, HashMap};

/// `{{name}}` substitution over a fixed table of message bodies.
#[derive(Debug, Clone)]
pub struct PlainTemplateRenderer {
    templates: HashMap<String, String>,
}

impl PlainTemplateRenderer {
    pub fn new() -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(
            templates::CONFIRMATION_REQUEST.to_string(),
            "Please confirm your appointment on {{starts_at}}. Reply YES before {{deadline}} or it will be released."
                .to_string(),
        );
        bodies.insert(
            templates::BOOKING_AUTO_CANCELLED.to_string(),
            "Your appointment on {{starts_at}} was released because it was not confirmed in time.".to_string(),
        );
        bodies.insert(
            templates::WAITLIST_OFFER.to_string(),
            "A slot opened on {{starts_at}}. Reply by {{deadline}} to take it.".to_string(),
        );
        bodies.insert(
            templates::WAITLIST_OFFER_LAPSED.to_string(),
            "The slot on {{starts_at}} was offered to the next person. You are still on the waitlist.".to_string(),
        );
        Self { templates: bodies }
    }

    pub fn with_template(mut self, key: &str, body: &str) -> Self {
        self.templates.insert(key.to_string(), body.to_string());
        self
    }
}

impl Default for PlainTemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateRenderer for PlainTemplateRenderer {
    async fn render(
        &self,
        template_key: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, RenderError> {
        let template = self
            .templates
            .get(template_key)
            .ok_or_else(|| RenderError::UnknownTemplate(template_key.to_string()))?;

        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let name = after[..close].trim();
            let value = variables.get(name).ok_or_else(|| RenderError::MissingVariable {
                template: template_key.to_string(),
                variable: name.to_string(),
            })?;
            out.push_str(value);
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_substitutes_variables() {
        let renderer = PlainTemplateRenderer::new().with_template("t", "Hi {{ name }}, see you {{when}}.");
        let vars = BTreeMap::from([
            ("name".to_string(), "Anna".to_string()),
            ("when".to_string(), "Friday".to_string()),
        ]);
        assert_eq!(renderer.render("t", &vars).await.unwrap(), "Hi Anna, see you Friday.");
    }

    #[tokio::test]
    async fn test_missing_variable_is_an_error() {
        let renderer = PlainTemplateRenderer::new();
        let err = renderer
            .render(templates::WAITLIST_OFFER, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingVariable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let renderer = PlainTemplateRenderer::new();
        assert_eq!(
            renderer.render("nope", &BTreeMap::new()).await,
            Err(RenderError::UnknownTemplate("nope".to_string()))
        );
    }
}

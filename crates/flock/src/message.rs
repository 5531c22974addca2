//! Confirmation message posted to the conversation after a scrap is saved.

use std::sync::Arc;

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::client::SendMessageRequest;
use crate::events::SlashCommandEvent;

pub const MESSAGE_TEMPLATE: &str = "message.flockml";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template `{name}` failed to render: {source}")]
    Template { name: &'static str, source: tera::Error },
}

#[derive(Serialize)]
struct MessageContext<'a> {
    event: &'a SlashCommandEvent,
    widget_url: &'a str,
}

/// Renders the FlockML body and plain-text summary for a saved scrap.
#[derive(Clone)]
pub struct MessageRenderer {
    templates: Arc<Tera>,
    widget_url: String,
}

impl MessageRenderer {
    pub fn new(templates: Arc<Tera>, widget_url: impl Into<String>) -> Self {
        Self { templates, widget_url: widget_url.into() }
    }

    pub fn render(&self, event: &SlashCommandEvent) -> Result<SendMessageRequest, RenderError> {
        let context = Context::from_serialize(MessageContext {
            event,
            widget_url: &self.widget_url,
        })
        .map_err(|source| RenderError::Template { name: MESSAGE_TEMPLATE, source })?;

        let flockml = self
            .templates
            .render(MESSAGE_TEMPLATE, &context)
            .map_err(|source| RenderError::Template { name: MESSAGE_TEMPLATE, source })?;

        Ok(SendMessageRequest {
            to: event.chat.0.clone(),
            text: summary_text(event),
            flockml: Some(flockml.trim().to_owned()),
        })
    }
}

pub fn summary_text(event: &SlashCommandEvent) -> String {
    format!("{} saved a scrap: {}", event.user_name, event.text)
}

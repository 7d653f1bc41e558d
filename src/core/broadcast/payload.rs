//! Turns a [`BroadcastRequest`] into the message a provider puts on the wire.
//!
//! Selection order: image (with caption, optional footer and buttons), then
//! text with buttons, then plain text. Buttons that lack required fields are
//! dropped silently; kept buttons keep their declared 1-based position.

use super::types::{BroadcastRequest, Button, ButtonKind, ImagePayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateAction {
    QuickReply { id: String },
    Url { url: String },
    Call { phone_number: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateButton {
    /// Declared 1-based position, stable even when earlier buttons are dropped.
    pub index: usize,
    pub display_text: String,
    pub action: TemplateAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    Buttons {
        text: String,
        footer: String,
        buttons: Vec<TemplateButton>,
    },
    Image {
        image: ImagePayload,
        caption: String,
        footer: Option<String>,
        buttons: Vec<TemplateButton>,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Text { .. } => "text",
            OutboundMessage::Buttons { .. } => "buttons",
            OutboundMessage::Image { .. } => "image",
        }
    }

    /// The human-readable body (text or caption).
    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { text } | OutboundMessage::Buttons { text, .. } => text,
            OutboundMessage::Image { caption, .. } => caption,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_button(position: usize, button: &Button, run_tag: &str) -> Option<TemplateButton> {
    let display_text = button.display_text.trim();
    if display_text.is_empty() {
        return None;
    }

    let action = match button.kind {
        ButtonKind::Reply => TemplateAction::QuickReply {
            id: format!("reply-btn-{}-{}", run_tag, position - 1),
        },
        ButtonKind::Url => TemplateAction::Url {
            url: non_empty(button.payload.as_deref())?.to_string(),
        },
        ButtonKind::Call => TemplateAction::Call {
            phone_number: non_empty(button.payload.as_deref())?.to_string(),
        },
    };

    Some(TemplateButton {
        index: position,
        display_text: display_text.to_string(),
        action,
    })
}

/// Keeps only the buttons that can be rendered, numbered by declared position.
pub fn resolve_buttons(buttons: &[Button], run_tag: &str) -> Vec<TemplateButton> {
    buttons
        .iter()
        .enumerate()
        .filter_map(|(idx, button)| resolve_button(idx + 1, button, run_tag))
        .collect()
}

/// Builds the per-recipient message. `run_tag` namespaces reply-button ids.
/// Content presence is the dispatcher's admission check, not ours.
pub fn build_message(request: &BroadcastRequest, run_tag: &str) -> OutboundMessage {
    let buttons = resolve_buttons(&request.buttons, run_tag);
    let footer = non_empty(request.footer.as_deref()).map(str::to_string);

    if let Some(image) = &request.image {
        return OutboundMessage::Image {
            image: image.clone(),
            caption: request.message.clone(),
            footer,
            buttons,
        };
    }

    if !buttons.is_empty() {
        return OutboundMessage::Buttons {
            text: request.message.clone(),
            footer: footer.unwrap_or_default(),
            buttons,
        };
    }

    OutboundMessage::Text {
        text: request.message.clone(),
    }
}

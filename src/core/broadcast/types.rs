use std::sync::Arc;

use base64::Engine;

use super::error::BroadcastError;

/// Provider limit on template buttons per message.
pub const MAX_BUTTONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Qr,
    Connected,
    Running,
    Finished,
    Error,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Qr => "qr",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Running => "running",
            ConnectionStatus::Finished => "finished",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    /// States an operator can dismiss with an explicit close.
    pub fn is_dismissible(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Finished | ConnectionStatus::Error | ConnectionStatus::Disconnected
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Reply,
    Url,
    Call,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    pub display_text: String,
    /// URL for `url` buttons, phone number for `call` buttons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Button {
    pub fn reply(display_text: impl Into<String>) -> Self {
        Self {
            kind: ButtonKind::Reply,
            display_text: display_text.into(),
            payload: None,
        }
    }

    pub fn url(display_text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: ButtonKind::Url,
            display_text: display_text.into(),
            payload: Some(url.into()),
        }
    }

    pub fn call(display_text: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            kind: ButtonKind::Call,
            display_text: display_text.into(),
            payload: Some(phone_number.into()),
        }
    }
}

/// Binary image attached to a broadcast. Cheap to clone across recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Decodes `data:<mime>;base64,<payload>`. A bare base64 string is accepted
    /// and typed as `application/octet-stream`.
    pub fn from_data_url(data_url: &str) -> Result<Self, BroadcastError> {
        let (content_type, encoded) = match data_url.split_once(";base64,") {
            Some((header, encoded)) => {
                let mime = header.strip_prefix("data:").unwrap_or(header).trim();
                let mime = if mime.is_empty() {
                    "application/octet-stream"
                } else {
                    mime
                };
                (mime.to_string(), encoded)
            }
            None => ("application/octet-stream".to_string(), data_url),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| BroadcastError::InvalidImage(e.to_string()))?;
        if bytes.is_empty() {
            return Err(BroadcastError::InvalidImage("image is empty".to_string()));
        }
        Ok(Self::new(bytes, content_type))
    }
}

/// One fully-resolved broadcast. Immutable once handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub recipients: Vec<String>,
    pub message: String,
    pub footer: Option<String>,
    pub buttons: Vec<Button>,
    pub delay_secs: u64,
    pub image: Option<ImagePayload>,
}

impl BroadcastRequest {
    pub fn new(recipients: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            recipients,
            message: message.into(),
            footer: None,
            buttons: Vec::new(),
            delay_secs: 1,
            image: None,
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        let footer = footer.into();
        self.footer = if footer.trim().is_empty() {
            None
        } else {
            Some(footer)
        };
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_delay_secs(mut self, delay_secs: u64) -> Self {
        self.delay_secs = delay_secs;
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn has_content(&self) -> bool {
        !self.message.trim().is_empty() || self.image.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub current_number: String,
}

impl Progress {
    pub fn reset(total: usize) -> Self {
        Self {
            current: 0,
            total,
            current_number: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success_count: usize,
    pub error_count: usize,
}

impl RunResult {
    pub fn attempted(&self) -> usize {
        self.success_count + self.error_count
    }
}

/// How a run left the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    ConnectionLost,
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    pub message: String,
}

impl StatusUpdate {
    pub fn new(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Everything observers can receive.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Status(StatusUpdate),
    Qr { artifact: String },
    Progress(Progress),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

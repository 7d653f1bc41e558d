use thiserror::Error;

/// Reasons a broadcast is refused before any message leaves. The `Display`
/// text is what operators see in the `error` status event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Another broadcast is already in progress.")]
    AlreadyRunning,
    #[error("WhatsApp is not connected. Please connect first.")]
    NotConnected,
    #[error("Please enter at least one valid phone number.")]
    EmptyRecipientList,
    #[error("Message cannot be empty.")]
    EmptyMessage,
    #[error("A message can carry at most {max} buttons (got {got}).")]
    TooManyButtons { max: usize, got: usize },
    #[error("Delay must be at least 1 second.")]
    InvalidDelay,
    #[error("Could not process the image file: {0}")]
    InvalidImage(String),
}

impl BroadcastError {
    pub fn code(&self) -> &'static str {
        match self {
            BroadcastError::AlreadyRunning => "already_running",
            BroadcastError::NotConnected => "not_connected",
            BroadcastError::EmptyRecipientList => "empty_recipient_list",
            BroadcastError::EmptyMessage => "empty_message",
            BroadcastError::TooManyButtons { .. } => "too_many_buttons",
            BroadcastError::InvalidDelay => "invalid_delay",
            BroadcastError::InvalidImage(_) => "invalid_image",
        }
    }
}

/// A single recipient could not be reached. Counted, never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SendError {
    pub reason: String,
}

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

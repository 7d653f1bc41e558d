//! Messaging transports the engine drives. A provider authenticates, reports
//! session lifecycle through a [`ProviderEventSink`], and delivers one
//! message per `send` call.

pub mod dry_run;
pub mod twilio;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::broadcast::error::SendError;
use crate::core::broadcast::payload::OutboundMessage;
use crate::core::config::{ProviderConfig, ProviderKind};

pub use dry_run::DryRunProvider;
pub use twilio::TwilioProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Opening,
    /// Raw pairing code; the engine renders it into a QR artifact.
    PairingRequired { code: String },
    Closed { reason: String, permanent: bool },
}

/// Engine-owned channel a provider reports lifecycle events into.
#[derive(Debug, Clone)]
pub struct ProviderEventSink {
    tx: mpsc::UnboundedSender<ProviderEvent>,
}

impl ProviderEventSink {
    pub fn new(tx: mpsc::UnboundedSender<ProviderEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the engine has gone away.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn opening(&self) -> bool {
        self.emit(ProviderEvent::Opening)
    }

    pub fn pairing_required(&self, code: impl Into<String>) -> bool {
        self.emit(ProviderEvent::PairingRequired { code: code.into() })
    }

    pub fn closed(&self, reason: impl Into<String>, permanent: bool) -> bool {
        self.emit(ProviderEvent::Closed {
            reason: reason.into(),
            permanent,
        })
    }
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Starts (or resumes) a session. Lifecycle progress is reported through
    /// `sink`; an `Err` means the attempt could not even begin.
    async fn connect(&self, sink: ProviderEventSink) -> Result<()>;

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), SendError>;

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn MessagingProvider>> {
    match config.kind {
        ProviderKind::DryRun => Ok(Arc::new(DryRunProvider::new(config.dry_run.clone()))),
        ProviderKind::Twilio => Ok(Arc::new(TwilioProvider::new(config.twilio.clone())?)),
    }
}

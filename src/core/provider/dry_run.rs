use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;

use super::{MessagingProvider, ProviderEventSink};
use crate::core::broadcast::error::SendError;
use crate::core::broadcast::payload::OutboundMessage;
use crate::core::config::DryRunConfig;

/// Offline provider: pairs once, then pretends to deliver by logging.
pub struct DryRunProvider {
    config: DryRunConfig,
    paired: AtomicBool,
    open: AtomicBool,
    sink: Mutex<Option<ProviderEventSink>>,
}

impl DryRunProvider {
    pub fn new(config: DryRunConfig) -> Self {
        Self {
            config,
            paired: AtomicBool::new(false),
            open: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    fn sink(&self) -> MutexGuard<'_, Option<ProviderEventSink>> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Simulates the transport dropping. A permanent drop forgets the pairing.
    pub fn drop_connection(&self, reason: &str, permanent: bool) {
        self.open.store(false, Ordering::Release);
        if permanent {
            self.paired.store(false, Ordering::Release);
        }
        if let Some(sink) = self.sink().as_ref() {
            sink.closed(reason, permanent);
        }
    }

    fn pairing_code() -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        format!("2@{}", token)
    }
}

pub fn jid(number: &str) -> String {
    format!("{}@s.whatsapp.net", number)
}

#[async_trait]
impl MessagingProvider for DryRunProvider {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn connect(&self, sink: ProviderEventSink) -> Result<()> {
        *self.sink() = Some(sink.clone());

        if self.paired.load(Ordering::Acquire) {
            info!("[dry-run] Resuming paired session");
            self.open.store(true, Ordering::Release);
            sink.opening();
            return Ok(());
        }

        let code = Self::pairing_code();
        info!("[dry-run] Pairing required; auto-pairing in {}ms", self.config.pair_after_ms);
        sink.pairing_required(code);

        tokio::time::sleep(Duration::from_millis(self.config.pair_after_ms)).await;
        self.paired.store(true, Ordering::Release);
        self.open.store(true, Ordering::Release);
        sink.opening();
        Ok(())
    }

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::new("session is not open"));
        }
        if self.config.send_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.send_latency_ms)).await;
        }
        if self.config.fail_numbers.iter().any(|n| n == recipient) {
            return Err(SendError::new(format!("{} is not on WhatsApp", recipient)));
        }
        info!(
            "[dry-run] {} message to {}: {}",
            message.kind(),
            jid(recipient),
            message.body()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        self.sink().take();
        Ok(())
    }
}

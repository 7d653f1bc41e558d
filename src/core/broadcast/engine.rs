use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::connection::{CloseDecision, ConnectDecision, ConnectionStateMachine, ReconnectPolicy};
use super::dispatcher::{CancelReason, Dispatcher, RunHandle};
use super::error::BroadcastError;
use super::events::{EventBroadcaster, Subscription};
use super::types::{BroadcastRequest, ConnectionStatus, Progress};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::provider::{MessagingProvider, ProviderEvent, ProviderEventSink};
use crate::core::qr;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub status: ConnectionStatus,
    pub message: String,
    pub progress: Progress,
    pub broadcasting: bool,
}

struct EngineInner {
    provider: Arc<dyn MessagingProvider>,
    machine: Arc<ConnectionStateMachine>,
    events: EventBroadcaster,
    dispatcher: Dispatcher,
    sink: ProviderEventSink,
    shutdown: CancellationToken,
}

/// The process-wide broadcast engine. Cheap to clone; every clone drives the
/// same session.
#[derive(Clone)]
pub struct BroadcastEngine {
    inner: Arc<EngineInner>,
}

impl BroadcastEngine {
    /// Must be called inside a tokio runtime: the provider event pump is
    /// spawned here.
    pub fn new(provider: Arc<dyn MessagingProvider>, policy: ReconnectPolicy) -> Self {
        let events = EventBroadcaster::new();
        let machine = Arc::new(ConnectionStateMachine::new(events.clone(), policy));
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(provider.clone(), machine.clone(), events.clone())
            .with_close_handler(close_tx.clone());
        let (sink, provider_rx) = ProviderEventSink::channel();

        let inner = Arc::new(EngineInner {
            provider,
            machine,
            events,
            dispatcher,
            sink,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(pump(Arc::downgrade(&inner), provider_rx, close_rx, close_tx));
        Self { inner }
    }

    pub fn provider_name(&self) -> &str {
        self.inner.provider.name()
    }

    pub async fn connect(&self) -> Result<ConnectDecision> {
        let decision = self.inner.machine.request_connect();
        if decision != ConnectDecision::Proceed {
            info!("Connect requested: {:?}", decision);
            return Ok(decision);
        }

        info!("Connecting via {} provider", self.inner.provider.name());
        if let Err(e) = self.inner.provider.connect(self.inner.sink.clone()).await {
            self.inner.machine.connect_failed(&e.to_string());
            return Err(e);
        }
        Ok(decision)
    }

    pub fn start(&self, request: BroadcastRequest) -> Result<RunHandle, BroadcastError> {
        self.inner.dispatcher.start(request)
    }

    pub fn stop(&self) -> bool {
        self.inner.dispatcher.stop()
    }

    /// Operator dismiss. An active run is stopped instead; its terminal
    /// status then needs its own close.
    pub fn close(&self) -> bool {
        if self.inner.dispatcher.is_running() {
            return self.inner.dispatcher.stop();
        }
        self.inner.machine.dismiss()
    }

    pub fn attach(&self) -> Subscription {
        self.inner.machine.attach_observer()
    }

    pub fn detach(&self, subscription: Subscription) {
        self.inner.events.detach(subscription.id());
    }

    pub fn observer_count(&self) -> usize {
        self.inner.events.observer_count()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.machine.status()
    }

    pub fn is_broadcasting(&self) -> bool {
        self.inner.dispatcher.is_running()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let update = self.inner.machine.snapshot();
        EngineSnapshot {
            status: update.status,
            message: update.message,
            progress: self.inner.dispatcher.progress(),
            broadcasting: self.inner.dispatcher.is_running(),
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.inner.dispatcher.stop();
        self.inner.shutdown.cancel();
        self.inner.provider.disconnect().await
    }
}

async fn pump(
    engine: std::sync::Weak<EngineInner>,
    mut provider_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    mut close_rx: mpsc::UnboundedReceiver<CloseDecision>,
    close_tx: mpsc::UnboundedSender<CloseDecision>,
) {
    let shutdown = match engine.upgrade() {
        Some(inner) => inner.shutdown.clone(),
        None => return,
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = provider_rx.recv() => {
                let (Some(event), Some(inner)) = (event, engine.upgrade()) else { break };
                if let Some(decision) = apply_provider_event(&inner, event) {
                    schedule(&inner, decision, close_tx.clone());
                }
            }
            decision = close_rx.recv() => {
                let (Some(decision), Some(inner)) = (decision, engine.upgrade()) else { break };
                schedule(&inner, decision, close_tx.clone());
            }
        }
    }
    info!("Provider event pump stopped");
}

fn apply_provider_event(inner: &EngineInner, event: ProviderEvent) -> Option<CloseDecision> {
    match event {
        ProviderEvent::Opening => {
            inner.machine.session_opened();
            None
        }
        ProviderEvent::PairingRequired { code } => {
            match qr::svg_data_url(&code) {
                Ok(artifact) => inner.machine.pairing_required(artifact),
                Err(e) => error!("Could not render pairing code: {}", e),
            }
            None
        }
        ProviderEvent::Closed { reason, permanent } => {
            let decision = inner.machine.connection_closed(&reason, permanent);
            if decision == CloseDecision::DeferredUntilRunEnds {
                inner.dispatcher.cancel(CancelReason::ConnectionLost);
            }
            Some(decision)
        }
    }
}

fn schedule(
    inner: &Arc<EngineInner>,
    decision: CloseDecision,
    close_tx: mpsc::UnboundedSender<CloseDecision>,
) {
    let CloseDecision::Reconnect { attempt, after } = decision else {
        return;
    };

    let provider = inner.provider.clone();
    let machine = inner.machine.clone();
    let sink = inner.sink.clone();
    let shutdown = inner.shutdown.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(after) => {}
        }
        if !machine.begin_reconnect(attempt) {
            info!("Reconnect attempt {} skipped; session state changed", attempt);
            return;
        }
        if let Err(e) = provider.connect(sink).await {
            warn!("Reconnect attempt {} failed: {}", attempt, e);
            let next = machine.connection_closed(&e.to_string(), false);
            let _ = close_tx.send(next);
        }
    });
}

#[async_trait::async_trait]
impl LifecycleComponent for BroadcastEngine {
    async fn on_init(&mut self) -> Result<()> {
        info!("Broadcast engine ready (provider: {})", self.provider_name());
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if self.is_broadcasting() {
            warn!("Shutting down with a broadcast in flight; stopping it");
        }
        self.shutdown().await
    }
}

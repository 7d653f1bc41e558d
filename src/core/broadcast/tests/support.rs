use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::core::broadcast::{
    BroadcastEngine, ConnectionStatus, EngineEvent, OutboundMessage, Progress, ReconnectPolicy,
    SendError, StatusUpdate, Subscription,
};
use crate::core::provider::{MessagingProvider, ProviderEventSink};

/// In-memory provider whose behavior each test scripts up front.
#[derive(Default)]
pub struct ScriptedProvider {
    pairing: bool,
    fail: HashSet<String>,
    panic_on: Option<String>,
    refuse_connect: AtomicBool,
    connects: AtomicUsize,
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    sink: Mutex<Option<ProviderEventSink>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first connect asks for pairing before opening.
    pub fn with_pairing(mut self) -> Self {
        self.pairing = true;
        self
    }

    pub fn failing(mut self, numbers: &[&str]) -> Self {
        self.fail = numbers.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn panicking_on(mut self, number: &str) -> Self {
        self.panic_on = Some(number.to_string());
        self
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn drop_connection(&self, reason: &str, permanent: bool) {
        let sink = self.sink.lock().unwrap().clone().unwrap();
        sink.closed(reason, permanent);
    }
}

#[async_trait]
impl MessagingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self, sink: ProviderEventSink) -> Result<()> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refuse_connect.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        *self.sink.lock().unwrap() = Some(sink.clone());
        if self.pairing && attempt == 1 {
            sink.pairing_required("2@scripted-pairing-code");
        }
        sink.opening();
        Ok(())
    }

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        if self.panic_on.as_deref() == Some(recipient) {
            panic!("provider blew up on {}", recipient);
        }
        if self.fail.contains(recipient) {
            return Err(SendError::new("recipient rejected"));
        }
        Ok(())
    }
}

pub fn engine(provider: &Arc<ScriptedProvider>) -> BroadcastEngine {
    BroadcastEngine::new(provider.clone(), ReconnectPolicy::default())
}

pub fn engine_with_policy(
    provider: &Arc<ScriptedProvider>,
    policy: ReconnectPolicy,
) -> BroadcastEngine {
    BroadcastEngine::new(provider.clone(), policy)
}

/// Connects and returns an observer positioned just after `connected`.
pub async fn connected(engine: &BroadcastEngine) -> Subscription {
    let mut sub = engine.attach();
    engine.connect().await.unwrap();
    wait_for_status(&mut sub, ConnectionStatus::Connected).await;
    sub
}

pub async fn next_event(sub: &mut Subscription) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(600), sub.recv())
        .await
        .expect("timed out waiting for an engine event")
        .expect("event stream closed")
}

pub async fn next_status(sub: &mut Subscription) -> StatusUpdate {
    loop {
        if let EngineEvent::Status(update) = next_event(sub).await {
            return update;
        }
    }
}

pub async fn wait_for_status(sub: &mut Subscription, status: ConnectionStatus) -> StatusUpdate {
    loop {
        let update = next_status(sub).await;
        if update.status == status {
            return update;
        }
    }
}

/// Collects progress ticks until the run's terminal status arrives.
pub async fn run_to_end(sub: &mut Subscription) -> (Vec<Progress>, StatusUpdate) {
    let mut ticks = Vec::new();
    loop {
        match next_event(sub).await {
            EngineEvent::Progress(p) => ticks.push(p),
            EngineEvent::Status(update)
                if matches!(
                    update.status,
                    ConnectionStatus::Finished | ConnectionStatus::Error
                ) =>
            {
                return (ticks, update);
            }
            _ => {}
        }
    }
}

pub fn numbers(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{EngineEvent, Progress, StatusUpdate};

pub type SubscriptionId = u64;

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    observers: HashMap<SubscriptionId, mpsc::UnboundedSender<EngineEvent>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fans engine events out to every attached observer. No history is kept:
/// an observer sees its synthetic first event and whatever comes after.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. `initial` is delivered before any other event.
    pub fn attach(&self, initial: EngineEvent) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(initial);

        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.observers.insert(id, tx);
        debug!("Observer {} attached ({} total)", id, registry.observers.len());

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        let removed = lock(&self.registry).observers.remove(&id).is_some();
        if removed {
            debug!("Observer {} detached", id);
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    pub fn status(&self, update: StatusUpdate) {
        self.publish(EngineEvent::Status(update));
    }

    pub fn progress(&self, progress: Progress) {
        self.publish(EngineEvent::Progress(progress));
    }

    pub fn qr(&self, artifact: String) {
        self.publish(EngineEvent::Qr { artifact });
    }

    fn publish(&self, event: EngineEvent) {
        // Observers whose receiving half is gone are pruned on the way.
        lock(&self.registry)
            .observers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Receiving side of one observer. Dropping it detaches the observer.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).observers.remove(&self.id);
        }
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::connection::{CloseDecision, ConnectionStateMachine};
use super::error::BroadcastError;
use super::events::EventBroadcaster;
use super::payload::build_message;
use super::recipients::normalize_entries;
use super::types::{BroadcastRequest, MAX_BUTTONS, Progress, RunOutcome, RunResult};
use crate::core::provider::MessagingProvider;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-run admission flag.
#[derive(Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the lifetime of a run; releases the guard however the run ends.
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Stopped,
    ConnectionLost,
}

struct RunControl {
    token: CancellationToken,
    reason: Mutex<Option<CancelReason>>,
}

impl RunControl {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        }
    }

    /// A lost connection overrides an earlier operator stop.
    fn cancel(&self, reason: CancelReason) {
        let mut current = lock(&self.reason);
        if current.is_none() || reason == CancelReason::ConnectionLost {
            *current = Some(reason);
        }
        self.token.cancel();
    }

    fn reason(&self) -> Option<CancelReason> {
        *lock(&self.reason)
    }
}

#[derive(Default)]
struct RunCounters {
    success: AtomicUsize,
    errors: AtomicUsize,
}

impl RunCounters {
    fn snapshot(&self) -> RunResult {
        RunResult {
            success_count: self.success.load(Ordering::Acquire),
            error_count: self.errors.load(Ordering::Acquire),
        }
    }
}

enum LoopExit {
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub result: RunResult,
    pub total: usize,
}

/// Returned by an accepted `start`. The run proceeds whether or not this is
/// awaited.
#[derive(Debug)]
pub struct RunHandle {
    pub run_tag: String,
    pub total: usize,
    done: oneshot::Receiver<RunReport>,
}

impl RunHandle {
    pub async fn wait(self) -> Option<RunReport> {
        self.done.await.ok()
    }
}

pub struct Dispatcher {
    provider: Arc<dyn MessagingProvider>,
    machine: Arc<ConnectionStateMachine>,
    events: EventBroadcaster,
    guard: RunGuard,
    active: Arc<Mutex<Option<Arc<RunControl>>>>,
    progress: Arc<Mutex<Progress>>,
    run_seq: AtomicU64,
    close_tx: Option<mpsc::UnboundedSender<CloseDecision>>,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn MessagingProvider>,
        machine: Arc<ConnectionStateMachine>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            provider,
            machine,
            events,
            guard: RunGuard::default(),
            active: Arc::new(Mutex::new(None)),
            progress: Arc::new(Mutex::new(Progress::default())),
            run_seq: AtomicU64::new(0),
            close_tx: None,
        }
    }

    /// Where deferred connection-close decisions go once a run finalizes.
    pub fn with_close_handler(mut self, tx: mpsc::UnboundedSender<CloseDecision>) -> Self {
        self.close_tx = Some(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn progress(&self) -> Progress {
        lock(&self.progress).clone()
    }

    /// Validates and launches a run. Rejections outside a run are also
    /// announced to observers as an `error` status event.
    pub fn start(&self, request: BroadcastRequest) -> Result<RunHandle, BroadcastError> {
        match self.admit(request) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!("Broadcast rejected: {}", e);
                self.machine.report_rejection(&e);
                Err(e)
            }
        }
    }

    fn admit(&self, mut request: BroadcastRequest) -> Result<RunHandle, BroadcastError> {
        let permit = self
            .guard
            .try_acquire()
            .ok_or(BroadcastError::AlreadyRunning)?;
        self.machine.ensure_connected()?;

        request.recipients = normalize_entries(&request.recipients).into_vec();
        if request.recipients.is_empty() {
            return Err(BroadcastError::EmptyRecipientList);
        }
        if !request.has_content() {
            return Err(BroadcastError::EmptyMessage);
        }
        if request.buttons.len() > MAX_BUTTONS {
            return Err(BroadcastError::TooManyButtons {
                max: MAX_BUTTONS,
                got: request.buttons.len(),
            });
        }
        if request.delay_secs < 1 {
            return Err(BroadcastError::InvalidDelay);
        }

        // Installed before the machine reports `running`, so a stop or a
        // connection loss seen from that point on reaches this run.
        let control = Arc::new(RunControl::new());
        *lock(&self.active) = Some(control.clone());
        if let Err(e) = self.machine.begin_run() {
            lock(&self.active).take();
            return Err(e);
        }

        let total = request.recipients.len();
        let run_tag = format!("{}", self.run_seq.fetch_add(1, Ordering::Relaxed) + 1);

        *lock(&self.progress) = Progress::reset(total);

        info!(
            "Broadcast {} started: {} recipient(s), {}s delay, provider {}",
            run_tag,
            total,
            request.delay_secs,
            self.provider.name()
        );

        let (done_tx, done_rx) = oneshot::channel();
        let run = Run {
            provider: self.provider.clone(),
            machine: self.machine.clone(),
            events: self.events.clone(),
            active: self.active.clone(),
            progress: self.progress.clone(),
            close_tx: self.close_tx.clone(),
            control,
            counters: Arc::new(RunCounters::default()),
            request: Arc::new(request),
            run_tag: run_tag.clone(),
        };
        tokio::spawn(run.supervise(permit, done_tx));

        Ok(RunHandle {
            run_tag,
            total,
            done: done_rx,
        })
    }

    /// Idempotent. Returns false when no run was active.
    pub fn stop(&self) -> bool {
        self.cancel(CancelReason::Stopped)
    }

    pub fn cancel(&self, reason: CancelReason) -> bool {
        match lock(&self.active).as_ref() {
            Some(control) => {
                info!("Cancelling active broadcast ({:?})", reason);
                control.cancel(reason);
                true
            }
            None => false,
        }
    }
}

struct Run {
    provider: Arc<dyn MessagingProvider>,
    machine: Arc<ConnectionStateMachine>,
    events: EventBroadcaster,
    active: Arc<Mutex<Option<Arc<RunControl>>>>,
    progress: Arc<Mutex<Progress>>,
    close_tx: Option<mpsc::UnboundedSender<CloseDecision>>,
    control: Arc<RunControl>,
    counters: Arc<RunCounters>,
    request: Arc<BroadcastRequest>,
    run_tag: String,
}

impl Run {
    /// Runs the loop in its own task so a panic inside a provider still
    /// reaches finalization.
    async fn supervise(self, permit: RunPermit, done: oneshot::Sender<RunReport>) {
        let total = self.request.recipients.len();
        let send_loop = tokio::spawn(send_loop(
            self.provider.clone(),
            self.request.clone(),
            self.run_tag.clone(),
            self.control.clone(),
            self.counters.clone(),
            self.events.clone(),
            self.progress.clone(),
        ));

        let outcome = match send_loop.await {
            Ok(LoopExit::Exhausted) => RunOutcome::Completed,
            Ok(LoopExit::Cancelled) => match self.control.reason() {
                Some(CancelReason::ConnectionLost) => RunOutcome::ConnectionLost,
                _ => RunOutcome::Stopped,
            },
            Err(e) => {
                error!("Broadcast {} aborted: {}", self.run_tag, e);
                RunOutcome::Faulted
            }
        };
        let result = self.counters.snapshot();

        lock(&self.active).take();
        drop(permit);

        info!(
            "Broadcast {} ended ({:?}): {} sent, {} failed, {} of {} processed",
            self.run_tag,
            outcome,
            result.success_count,
            result.error_count,
            result.attempted(),
            total
        );

        if let Some(decision) = self.machine.finish_run(outcome, result, total)
            && let Some(tx) = &self.close_tx
        {
            let _ = tx.send(decision);
        }

        let _ = done.send(RunReport {
            outcome,
            result,
            total,
        });
    }
}

async fn send_loop(
    provider: Arc<dyn MessagingProvider>,
    request: Arc<BroadcastRequest>,
    run_tag: String,
    control: Arc<RunControl>,
    counters: Arc<RunCounters>,
    events: EventBroadcaster,
    progress: Arc<Mutex<Progress>>,
) -> LoopExit {
    let total = request.recipients.len();
    let delay = Duration::from_secs(request.delay_secs);

    for (idx, number) in request.recipients.iter().enumerate() {
        if control.token.is_cancelled() {
            info!("Broadcast {} cancelled after {} of {}", run_tag, idx, total);
            return LoopExit::Cancelled;
        }

        let message = build_message(&request, &run_tag);
        match provider.send(number, &message).await {
            Ok(()) => {
                counters.success.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                counters.errors.fetch_add(1, Ordering::AcqRel);
                warn!("Failed to send to {}: {}", number, e);
            }
        }

        let tick = Progress {
            current: idx + 1,
            total,
            current_number: number.clone(),
        };
        *lock(&progress) = tick.clone();
        events.progress(tick);

        if idx + 1 < total {
            tokio::select! {
                _ = control.token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    LoopExit::Exhausted
}

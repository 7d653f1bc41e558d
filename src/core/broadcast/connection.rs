use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, warn};

use super::error::BroadcastError;
use super::events::{EventBroadcaster, Subscription};
use super::types::{ConnectionStatus, EngineEvent, RunOutcome, RunResult, StatusUpdate};

pub const MSG_IDLE: &str = "WhatsApp is idle.";
pub const MSG_CONNECTING: &str = "Initializing WhatsApp connection...";
pub const MSG_ALREADY_CONNECTED: &str = "WhatsApp is already connected!";
pub const MSG_CONNECT_FAILED: &str = "Failed to initialize connection. Please try again.";
pub const MSG_SCAN_QR: &str = "Scan QR code to connect.";
pub const MSG_CONNECTED: &str = "WhatsApp is connected!";
pub const MSG_DISCONNECTED: &str = "WhatsApp disconnected.";
pub const MSG_LOGGED_OUT: &str = "WhatsApp session logged out. Connect again to pair a new device.";
pub const MSG_RETRIES_EXHAUSTED: &str = "Reconnect attempts exhausted. Connect again to retry.";
pub const MSG_RUN_STARTED: &str = "Broadcast has started...";

pub fn can_transition(from: ConnectionStatus, to: ConnectionStatus) -> bool {
    use ConnectionStatus::*;
    if from == to {
        return true;
    }
    if to == Disconnected {
        return true;
    }
    match from {
        Idle => matches!(to, Connecting),
        Connecting => matches!(to, Qr | Connected | Error),
        Qr => matches!(to, Connected | Error),
        Connected => matches!(to, Running),
        Running => matches!(to, Finished | Error),
        Finished | Error => matches!(to, Idle | Connected | Connecting),
        Disconnected => matches!(to, Idle | Connected | Connecting),
    }
}

/// Bounded exponential backoff for non-permanent connection loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Wait before 1-based `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    Proceed,
    AlreadyConnected,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Reconnect { attempt: u32, after: Duration },
    GiveUp,
    LoggedOut,
    /// A run is iterating; the close is applied when it finalizes.
    DeferredUntilRunEnds,
}

#[derive(Debug, Clone)]
struct PendingClose {
    reason: String,
    permanent: bool,
}

struct MachineState {
    status: ConnectionStatus,
    message: String,
    session_open: bool,
    reconnect_attempts: u32,
    pending_close: Option<PendingClose>,
}

/// The process-wide session lifecycle. Every transition is announced to
/// observers while the state lock is held, so they see transitions in order.
pub struct ConnectionStateMachine {
    state: Mutex<MachineState>,
    events: EventBroadcaster,
    policy: ReconnectPolicy,
}

impl ConnectionStateMachine {
    pub fn new(events: EventBroadcaster, policy: ReconnectPolicy) -> Self {
        Self {
            state: Mutex::new(MachineState {
                status: ConnectionStatus::Idle,
                message: MSG_IDLE.to_string(),
                session_open: false,
                reconnect_attempts: 0,
                pending_close: None,
            }),
            events,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> StatusUpdate {
        let state = self.lock();
        StatusUpdate::new(state.status, state.message.clone())
    }

    pub fn is_session_open(&self) -> bool {
        self.lock().session_open
    }

    /// Attaches an observer whose first event is the current status.
    pub fn attach_observer(&self) -> Subscription {
        let state = self.lock();
        let initial = if state.status == ConnectionStatus::Connected {
            StatusUpdate::new(ConnectionStatus::Connected, MSG_ALREADY_CONNECTED)
        } else {
            StatusUpdate::new(state.status, state.message.clone())
        };
        self.events.attach(EngineEvent::Status(initial))
    }

    fn transition(&self, state: &mut MachineState, to: ConnectionStatus, message: &str) -> bool {
        if !can_transition(state.status, to) {
            warn!(
                "Ignoring connection transition {} -> {} ({})",
                state.status, to, message
            );
            return false;
        }
        info!("Connection status: {} -> {}", state.status, to);
        state.status = to;
        state.message = message.to_string();
        self.events.status(StatusUpdate::new(to, message));
        true
    }

    pub fn request_connect(&self) -> ConnectDecision {
        let mut state = self.lock();
        if state.session_open {
            match state.status {
                ConnectionStatus::Running => {}
                ConnectionStatus::Connected => {
                    state.message = MSG_ALREADY_CONNECTED.to_string();
                    self.events.status(StatusUpdate::new(
                        ConnectionStatus::Connected,
                        MSG_ALREADY_CONNECTED,
                    ));
                }
                _ => {
                    self.transition(&mut state, ConnectionStatus::Connected, MSG_ALREADY_CONNECTED);
                }
            }
            return ConnectDecision::AlreadyConnected;
        }
        if matches!(
            state.status,
            ConnectionStatus::Connecting | ConnectionStatus::Qr
        ) {
            return ConnectDecision::InProgress;
        }
        state.reconnect_attempts = 0;
        self.transition(&mut state, ConnectionStatus::Connecting, MSG_CONNECTING);
        ConnectDecision::Proceed
    }

    pub fn connect_failed(&self, error: &str) {
        warn!("WhatsApp connection failed: {}", error);
        let mut state = self.lock();
        self.transition(&mut state, ConnectionStatus::Error, MSG_CONNECT_FAILED);
    }

    /// Emits the artifact first so observers have it when the status flips.
    pub fn pairing_required(&self, artifact: String) {
        let mut state = self.lock();
        if !can_transition(state.status, ConnectionStatus::Qr) {
            warn!("Pairing artifact received in state {}; ignored", state.status);
            return;
        }
        info!("Pairing required, forwarding QR code to observers");
        self.events.qr(artifact);
        self.transition(&mut state, ConnectionStatus::Qr, MSG_SCAN_QR);
    }

    pub fn session_opened(&self) {
        let mut state = self.lock();
        state.session_open = true;
        state.reconnect_attempts = 0;
        state.pending_close = None;
        if state.status != ConnectionStatus::Running {
            self.transition(&mut state, ConnectionStatus::Connected, MSG_CONNECTED);
        }
    }

    pub fn connection_closed(&self, reason: &str, permanent: bool) -> CloseDecision {
        let mut state = self.lock();
        state.session_open = false;
        if state.status == ConnectionStatus::Running {
            warn!("Connection lost mid-broadcast: {}", reason);
            state.pending_close = Some(PendingClose {
                reason: reason.to_string(),
                permanent,
            });
            return CloseDecision::DeferredUntilRunEnds;
        }
        self.apply_close(&mut state, reason, permanent)
    }

    fn apply_close(&self, state: &mut MachineState, reason: &str, permanent: bool) -> CloseDecision {
        if permanent {
            info!("Connection closed permanently ({}); waiting for operator", reason);
            self.transition(state, ConnectionStatus::Disconnected, MSG_LOGGED_OUT);
            return CloseDecision::LoggedOut;
        }

        state.reconnect_attempts += 1;
        if state.reconnect_attempts > self.policy.max_attempts {
            warn!(
                "Connection closed ({}); giving up after {} reconnect attempt(s)",
                reason, self.policy.max_attempts
            );
            self.transition(state, ConnectionStatus::Disconnected, MSG_RETRIES_EXHAUSTED);
            return CloseDecision::GiveUp;
        }

        let attempt = state.reconnect_attempts;
        let after = self.policy.backoff_for(attempt);
        info!(
            "Connection closed ({}); reconnect attempt {} in {:?}",
            reason, attempt, after
        );
        self.transition(state, ConnectionStatus::Disconnected, MSG_DISCONNECTED);
        CloseDecision::Reconnect { attempt, after }
    }

    /// Returns false when the retry is no longer needed.
    pub fn begin_reconnect(&self, attempt: u32) -> bool {
        let mut state = self.lock();
        if state.session_open
            || !matches!(
                state.status,
                ConnectionStatus::Disconnected | ConnectionStatus::Idle | ConnectionStatus::Error
            )
        {
            return false;
        }
        let message = format!(
            "Reconnecting to WhatsApp (attempt {} of {})...",
            attempt, self.policy.max_attempts
        );
        self.transition(&mut state, ConnectionStatus::Connecting, &message)
    }

    /// Read-only admission check, done before the request itself is validated.
    pub fn ensure_connected(&self) -> Result<(), BroadcastError> {
        let state = self.lock();
        match state.status {
            ConnectionStatus::Running => Err(BroadcastError::AlreadyRunning),
            ConnectionStatus::Connected if state.session_open => Ok(()),
            _ => Err(BroadcastError::NotConnected),
        }
    }

    /// Moves an open, connected session into `running`.
    pub fn begin_run(&self) -> Result<(), BroadcastError> {
        let mut state = self.lock();
        match state.status {
            ConnectionStatus::Running => Err(BroadcastError::AlreadyRunning),
            ConnectionStatus::Connected if state.session_open => {
                self.transition(&mut state, ConnectionStatus::Running, MSG_RUN_STARTED);
                Ok(())
            }
            _ => Err(BroadcastError::NotConnected),
        }
    }

    /// Emits the run's single terminal status, then applies a close that
    /// arrived while the loop was iterating.
    pub fn finish_run(
        &self,
        outcome: RunOutcome,
        result: RunResult,
        total: usize,
    ) -> Option<CloseDecision> {
        let mut state = self.lock();
        let (status, message) = terminal_status(outcome, result, total);
        if state.status == ConnectionStatus::Running {
            self.transition(&mut state, status, &message);
        } else {
            // Never leave observers without the run's terminal message.
            state.status = status;
            state.message = message.clone();
            self.events.status(StatusUpdate::new(status, message));
        }

        let pending = state.pending_close.take()?;
        Some(self.apply_close(&mut state, &pending.reason, pending.permanent))
    }

    /// Operator close: returns a dismissible state to what the session allows.
    pub fn dismiss(&self) -> bool {
        let mut state = self.lock();
        if !state.status.is_dismissible() {
            return false;
        }
        if state.session_open {
            self.transition(&mut state, ConnectionStatus::Connected, MSG_CONNECTED)
        } else {
            self.transition(&mut state, ConnectionStatus::Idle, MSG_IDLE)
        }
    }

    /// Announces a refused start without touching the lifecycle. The error
    /// is followed by the unchanged current status so observers settle back
    /// on it. Returns false when nothing was announced: a run in progress
    /// owns the status stream and the refusal goes to the caller only.
    pub fn report_rejection(&self, error: &BroadcastError) -> bool {
        let state = self.lock();
        if *error == BroadcastError::AlreadyRunning || state.status == ConnectionStatus::Running {
            return false;
        }
        self.events
            .status(StatusUpdate::new(ConnectionStatus::Error, error.to_string()));
        self.events
            .status(StatusUpdate::new(state.status, state.message.clone()));
        true
    }
}

pub fn terminal_status(
    outcome: RunOutcome,
    result: RunResult,
    total: usize,
) -> (ConnectionStatus, String) {
    let processed = result.attempted();
    match outcome {
        RunOutcome::Completed | RunOutcome::Stopped => {
            let message = if result.error_count == 0 {
                "Broadcast completed successfully.".to_string()
            } else {
                format!(
                    "Broadcast completed with {} failure(s).",
                    result.error_count
                )
            };
            (ConnectionStatus::Finished, message)
        }
        RunOutcome::ConnectionLost => (
            ConnectionStatus::Error,
            format!(
                "Connection lost during broadcast: {} of {} processed, {} failure(s).",
                processed, total, result.error_count
            ),
        ),
        RunOutcome::Faulted => (
            ConnectionStatus::Error,
            format!(
                "Broadcast aborted unexpectedly: {} of {} processed, {} failure(s).",
                processed, total, result.error_count
            ),
        ),
    }
}

//! The broadcast dispatch engine: session lifecycle, recipient normalization,
//! the cancellable send loop and observer fan-out.

pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod payload;
pub mod recipients;
pub mod types;

#[cfg(test)]
mod tests;

pub use connection::{ConnectDecision, ConnectionStateMachine, ReconnectPolicy, can_transition};
pub use dispatcher::{RunHandle, RunReport};
pub use engine::{BroadcastEngine, EngineSnapshot};
pub use error::{BroadcastError, SendError};
pub use events::{EventBroadcaster, Subscription};
pub use payload::{OutboundMessage, build_message};
pub use recipients::{RecipientList, normalize_entries, normalize_recipients};
pub use types::{
    BroadcastRequest, Button, ButtonKind, ConnectionStatus, EngineEvent, ImagePayload, MAX_BUTTONS,
    Progress, RunOutcome, RunResult, StatusUpdate, Template,
};

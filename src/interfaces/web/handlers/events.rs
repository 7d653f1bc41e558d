use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::broadcast::{IntakeError, StartBroadcastBody, build_request};
use crate::core::broadcast::BroadcastError;
use crate::interfaces::web::AppState;

/// Commands a dashboard may send over the event socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    Connect,
    Start(StartBroadcastBody),
    Stop,
    Close,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut subscription = state.engine.attach();
    info!("Event observer attached ({} total)", state.engine.observer_count());

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Could not encode engine event: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text(&state, text.as_str()).await
                            && socket.send(Message::Text(reply.to_string().into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.engine.detach(subscription);
    info!("Event observer detached ({} left)", state.engine.observer_count());
}

/// Applies one client command. Engine outcomes reach every observer as
/// status events; only problems observers never hear about get a direct
/// reply.
pub(crate) async fn handle_text(state: &AppState, text: &str) -> Option<serde_json::Value> {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => return Some(command_error("invalid_command", &e.to_string())),
    };

    match command {
        ClientCommand::Connect => {
            let engine = state.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.connect().await {
                    warn!("Connect from event socket failed: {}", e);
                }
            });
            None
        }
        ClientCommand::Start(body) => match build_request(state, body).await {
            // Other admission failures are already broadcast as error statuses.
            Ok(request) => match state.engine.start(request) {
                Err(e @ BroadcastError::AlreadyRunning) => {
                    Some(command_error(e.code(), &e.to_string()))
                }
                _ => None,
            },
            Err(IntakeError::TemplateNotFound(id)) => Some(command_error(
                "template_not_found",
                &format!("Template '{}' not found", id),
            )),
            Err(IntakeError::Storage(e)) => Some(command_error("storage", &e)),
            Err(IntakeError::Rejected(e)) => Some(command_error(e.code(), &e.to_string())),
        },
        ClientCommand::Stop => {
            state.engine.stop();
            None
        }
        ClientCommand::Close => {
            state.engine.close();
            None
        }
    }
}

fn command_error(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "command_error",
        "data": { "code": code, "message": message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broadcast::{ConnectionStatus, EngineEvent, StatusUpdate};
    use crate::interfaces::web::handlers::test_support::test_state;

    #[test]
    fn commands_parse_from_tagged_json() {
        let start: ClientCommand = serde_json::from_str(
            r#"{"command":"start","numbers":"628111111","message":"Hi","delay":2}"#,
        )
        .unwrap();
        match start {
            ClientCommand::Start(body) => {
                assert_eq!(body.message.as_deref(), Some("Hi"));
                assert_eq!(body.delay_secs, Some(2));
            }
            other => panic!("expected start, got {:?}", other),
        }
        assert!(matches!(
            serde_json::from_str::<ClientCommand>(r#"{"command":"stop"}"#).unwrap(),
            ClientCommand::Stop
        ));
    }

    #[tokio::test]
    async fn unknown_commands_get_a_direct_error() {
        let (state, _dir) = test_state("127.0.0.1", None).await;
        let reply = handle_text(&state, r#"{"command":"explode"}"#).await.unwrap();
        assert_eq!(reply["event"], "command_error");
        assert_eq!(reply["data"]["code"], "invalid_command");
    }

    #[tokio::test]
    async fn start_while_disconnected_is_broadcast_as_an_error_status() {
        let (state, _dir) = test_state("127.0.0.1", None).await;
        let mut sub = state.engine.attach();
        assert!(sub.try_recv().is_some());

        let reply = handle_text(
            &state,
            r#"{"command":"start","numbers":["628111111"],"message":"Hi"}"#,
        )
        .await;
        assert!(reply.is_none());
        assert_eq!(
            sub.try_recv(),
            Some(EngineEvent::Status(StatusUpdate::new(
                ConnectionStatus::Error,
                "WhatsApp is not connected. Please connect first."
            )))
        );
    }

    #[tokio::test]
    async fn second_start_is_refused_to_the_sender_only() {
        let (state, _dir) = test_state("127.0.0.1", None).await;
        let mut sub = state.engine.attach();
        state.engine.connect().await.unwrap();
        while let Some(event) = sub.recv().await {
            if matches!(&event, EngineEvent::Status(u) if u.status == ConnectionStatus::Connected) {
                break;
            }
        }

        let start = r#"{"command":"start","numbers":["628111111","628222222"],"message":"Hi"}"#;
        assert!(handle_text(&state, start).await.is_none());
        let reply = handle_text(&state, start).await.unwrap();
        assert_eq!(reply["event"], "command_error");
        assert_eq!(reply["data"]["code"], "already_running");

        state.engine.stop();
        while let Some(event) = sub.recv().await {
            if let EngineEvent::Status(update) = event {
                assert_ne!(update.status, ConnectionStatus::Error);
                if update.status == ConnectionStatus::Finished {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn invalid_image_is_reported_to_the_sender_only() {
        let (state, _dir) = test_state("127.0.0.1", None).await;
        let mut sub = state.engine.attach();
        sub.try_recv();

        let reply = handle_text(
            &state,
            r#"{"command":"start","numbers":["628111111"],"image":"data:image/png;base64,%%%"}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["data"]["code"], "invalid_image");
        assert_eq!(sub.try_recv(), None);
    }
}

use std::sync::Arc;
use std::time::Duration;

use super::support::{
    ScriptedProvider, connected, engine, engine_with_policy, next_event, next_status, numbers,
    run_to_end, wait_for_status,
};
use crate::core::broadcast::{
    BroadcastRequest, ConnectDecision, ConnectionStatus, EngineEvent, ReconnectPolicy,
    StatusUpdate,
};

#[tokio::test(start_paused = true)]
async fn first_connect_pairs_through_a_qr_artifact() {
    let provider = Arc::new(ScriptedProvider::new().with_pairing());
    let engine = engine(&provider);
    let mut sub = engine.attach();

    assert_eq!(engine.connect().await.unwrap(), ConnectDecision::Proceed);

    assert_eq!(
        next_event(&mut sub).await,
        EngineEvent::Status(StatusUpdate::new(ConnectionStatus::Idle, "WhatsApp is idle."))
    );
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(
            ConnectionStatus::Connecting,
            "Initializing WhatsApp connection..."
        )
    );
    match next_event(&mut sub).await {
        EngineEvent::Qr { artifact } => {
            assert!(artifact.starts_with("data:image/svg+xml;base64,"))
        }
        other => panic!("expected qr artifact, got {:?}", other),
    }
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(ConnectionStatus::Qr, "Scan QR code to connect.")
    );
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(ConnectionStatus::Connected, "WhatsApp is connected!")
    );
}

#[tokio::test(start_paused = true)]
async fn connect_while_open_does_not_reconnect() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let mut sub = connected(&engine).await;

    assert_eq!(
        engine.connect().await.unwrap(),
        ConnectDecision::AlreadyConnected
    );
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(ConnectionStatus::Connected, "WhatsApp is already connected!")
    );
    assert_eq!(provider.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_reports_error_and_can_be_retried() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.refuse_connect(true);
    let engine = engine(&provider);
    let mut sub = engine.attach();

    assert!(engine.connect().await.is_err());
    assert_eq!(
        wait_for_status(&mut sub, ConnectionStatus::Error).await.message,
        "Failed to initialize connection. Please try again."
    );

    provider.refuse_connect(false);
    engine.connect().await.unwrap();
    wait_for_status(&mut sub, ConnectionStatus::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn logout_waits_for_the_operator() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let mut sub = connected(&engine).await;

    provider.drop_connection("logged out", true);
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(
            ConnectionStatus::Disconnected,
            "WhatsApp session logged out. Connect again to pair a new device."
        )
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.connects(), 1);
    assert_eq!(engine.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn transient_loss_retries_until_attempts_run_out() {
    let provider = Arc::new(ScriptedProvider::new());
    let policy = ReconnectPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(5),
    };
    let engine = engine_with_policy(&provider, policy);
    let mut sub = connected(&engine).await;

    provider.refuse_connect(true);
    provider.drop_connection("stream errored", false);

    assert_eq!(
        wait_for_status(&mut sub, ConnectionStatus::Disconnected).await.message,
        "WhatsApp disconnected."
    );
    assert_eq!(
        next_status(&mut sub).await.message,
        "Reconnecting to WhatsApp (attempt 1 of 2)..."
    );
    assert_eq!(
        next_status(&mut sub).await.status,
        ConnectionStatus::Disconnected
    );
    assert_eq!(
        next_status(&mut sub).await.message,
        "Reconnecting to WhatsApp (attempt 2 of 2)..."
    );
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(
            ConnectionStatus::Disconnected,
            "Reconnect attempts exhausted. Connect again to retry."
        )
    );
    assert_eq!(provider.connects(), 3);

    // An explicit connect starts over.
    provider.refuse_connect(false);
    engine.connect().await.unwrap();
    wait_for_status(&mut sub, ConnectionStatus::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn close_dismisses_finished_runs_and_stops_active_ones() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let mut sub = connected(&engine).await;

    let handle = engine
        .start(
            BroadcastRequest::new(numbers(&["628111111", "628222222"]), "Hi").with_delay_secs(30),
        )
        .unwrap();
    next_status(&mut sub).await;
    assert!(engine.close());
    let (_, terminal) = run_to_end(&mut sub).await;
    assert_eq!(terminal.status, ConnectionStatus::Finished);
    handle.wait().await.unwrap();

    assert!(engine.close());
    assert_eq!(
        next_status(&mut sub).await,
        StatusUpdate::new(ConnectionStatus::Connected, "WhatsApp is connected!")
    );
    assert!(!engine.close());
}

#[tokio::test(start_paused = true)]
async fn observer_attaching_mid_run_sees_only_current_status() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let _sub = connected(&engine).await;

    let handle = engine
        .start(
            BroadcastRequest::new(numbers(&["628111111", "628222222"]), "Hi").with_delay_secs(5),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut late = engine.attach();
    assert_eq!(
        late.try_recv(),
        Some(EngineEvent::Status(StatusUpdate::new(
            ConnectionStatus::Running,
            "Broadcast has started..."
        )))
    );
    assert_eq!(late.try_recv(), None);

    let (ticks, _) = run_to_end(&mut late).await;
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].current, 2);
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropped_observers_are_detached() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let sub = engine.attach();
    let other = engine.attach();
    assert_eq!(engine.observer_count(), 2);

    engine.detach(sub);
    drop(other);
    assert_eq!(engine.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_run_and_the_pump() {
    let provider = Arc::new(ScriptedProvider::new());
    let engine = engine(&provider);
    let mut sub = connected(&engine).await;

    let handle = engine
        .start(
            BroadcastRequest::new(numbers(&["628111111", "628222222"]), "Hi").with_delay_secs(30),
        )
        .unwrap();
    while !matches!(next_event(&mut sub).await, EngineEvent::Progress(_)) {}
    engine.shutdown().await.unwrap();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.result.attempted(), 1);
    assert!(!engine.is_broadcasting());
}

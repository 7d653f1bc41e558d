pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::broadcast::BroadcastEngine;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::templates::TemplateStore;

pub use router::build_api_router;

pub struct ApiServer {
    state: AppState,
    shutdown: CancellationToken,
}

pub struct ApiServerConfig {
    pub engine: BroadcastEngine,
    pub templates: TemplateStore,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub api_host: String,
    pub api_port: u16,
    pub api_token: Option<String>,
    pub default_delay_secs: u64,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) engine: BroadcastEngine,
    pub(crate) templates: TemplateStore,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) api_token: Option<String>,
    pub(crate) default_delay_secs: u64,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                engine: config.engine,
                templates: config.templates,
                log_tx: config.log_tx,
                api_host: config.api_host,
                api_port: config.api_port,
                api_token: config.api_token.filter(|t| !t.trim().is_empty()),
                default_delay_secs: config.default_delay_secs,
            },
            shutdown: CancellationToken::new(),
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| {
        match msg {
            Ok(log) => Ok(Event::default().data(log)), // SSE properly encodes this
            Err(_) => Ok(Event::default().data("Log stream lagged")),
        }
    });

    Sse::new(stream)
}

// --- Lifecycle Implementations ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        if self.state.api_token.is_none() && !auth::is_loopback(&self.state.api_host) {
            tracing::warn!(
                "No api_token configured; requests to {} will be rejected",
                self.state.api_host
            );
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.state.api_host, self.state.api_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        let app = router::build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            info!("API Server running at http://{addr}");
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        Ok(())
    }
}

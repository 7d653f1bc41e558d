use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{ServeArgs, load_config};
use crate::core::broadcast::BroadcastEngine;
use crate::core::config::BlastrConfig;
use crate::core::lifecycle::{LifecycleManager, SharedComponent};
use crate::core::provider::build_provider;
use crate::core::templates::TemplateStore;
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging;

pub(crate) fn apply_overrides(config: &mut BlastrConfig, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(kind) = args.provider {
        config.provider.kind = kind;
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let log_tx = logging::init_tracing(false);
    let (data_dir, mut config) = load_config().await?;
    apply_overrides(&mut config, &args);

    info!("Starting blastr (data dir: {})", data_dir.display());

    let provider = build_provider(&config.provider)?;
    let engine = BroadcastEngine::new(provider, config.reconnect.policy());
    let templates = TemplateStore::open(&data_dir).await?;

    let api = ApiServer::new(ApiServerConfig {
        engine: engine.clone(),
        templates,
        log_tx,
        api_host: config.server.host.clone(),
        api_port: config.server.port,
        api_token: config.server.api_token.clone(),
        default_delay_secs: config.broadcast.default_delay_secs,
    });

    let mut lifecycle = LifecycleManager::new();
    let engine_component: SharedComponent = Arc::new(Mutex::new(engine.clone()));
    let api_component: SharedComponent = Arc::new(Mutex::new(api));
    lifecycle.attach(engine_component);
    lifecycle.attach(api_component);
    lifecycle.start().await?;

    let base = format!("http://{}:{}", config.server.host, config.server.port);
    GuideSection::new("blastr is serving")
        .status("Provider", engine.provider_name())
        .status("Status", &format!("{}/api/status", base))
        .status("Events", &format!("{}/api/events", base))
        .blank()
        .text("POST /api/connect to pair, then /api/broadcast/start.")
        .text("Press Ctrl+C to stop.")
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

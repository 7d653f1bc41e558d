use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{SendArgs, load_config};
use crate::core::broadcast::{
    BroadcastEngine, BroadcastRequest, ConnectionStatus, EngineEvent, ImagePayload,
    OutboundMessage, RunOutcome, SendError,
};
use crate::core::provider::{MessagingProvider, ProviderEvent, ProviderEventSink, build_provider};
use crate::core::qr;
use crate::core::templates::{TemplateStore, request_from_template};
use crate::core::terminal::{self, print_engine_status, print_progress};
use crate::logging;

/// Wraps a provider so pairing codes are also drawn in the terminal. The
/// engine itself only ever ships the rendered SVG to observers.
struct TerminalPairing {
    inner: Arc<dyn MessagingProvider>,
}

#[async_trait]
impl MessagingProvider for TerminalPairing {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&self, sink: ProviderEventSink) -> Result<()> {
        let (relay, mut events) = ProviderEventSink::channel();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let ProviderEvent::PairingRequired { code } = &event {
                    match qr::terminal(code) {
                        Ok(art) => println!("\n{}", art),
                        Err(e) => terminal::print_warn(&format!("Could not draw QR code: {}", e)),
                    }
                }
                if !sink.emit(event) {
                    break;
                }
            }
        });
        self.inner.connect(relay).await
    }

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), SendError> {
        self.inner.send(recipient, message).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }
}

pub(crate) async fn load_image(path: &Path) -> Result<ImagePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Image {} is empty", path.display());
    }
    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    Ok(ImagePayload::new(bytes, content_type.essence_str()))
}

async fn build_request(args: SendArgs, data_dir: &Path, default_delay: u64) -> Result<BroadcastRequest> {
    let mut recipients = args.numbers;
    if let Some(path) = &args.numbers_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        recipients.extend(raw.lines().map(str::to_string));
    }
    let delay_secs = args.delay_secs.unwrap_or(default_delay);

    let mut request = match &args.template_id {
        Some(id) => {
            let store = TemplateStore::open(data_dir).await?;
            let template = store
                .get(id)
                .await?
                .with_context(|| format!("Template '{}' not found", id))?;
            request_from_template(&template, recipients, delay_secs)
        }
        None => BroadcastRequest::new(recipients, String::new()).with_delay_secs(delay_secs),
    };

    if let Some(message) = args.message {
        request.message = message;
    }
    if let Some(footer) = args.footer {
        request = request.with_footer(footer);
    }
    if !args.buttons.is_empty() {
        request = request.with_buttons(args.buttons);
    }
    if let Some(path) = &args.image {
        request = request.with_image(load_image(path).await?);
    }
    Ok(request)
}

pub async fn run_send(args: SendArgs) -> Result<()> {
    // Progress goes to the terminal; logs would interleave with it.
    logging::init_tracing(true);
    let (data_dir, mut config) = load_config().await?;
    if let Some(kind) = args.provider {
        config.provider.kind = kind;
    }

    let request = build_request(args, &data_dir, config.broadcast.default_delay_secs).await?;

    let provider: Arc<dyn MessagingProvider> = Arc::new(TerminalPairing {
        inner: build_provider(&config.provider)?,
    });
    let engine = BroadcastEngine::new(provider, config.reconnect.policy());
    let mut events = engine.attach();

    let connecting = engine.clone();
    tokio::spawn(async move {
        // Failures surface as an error status below.
        let _ = connecting.connect().await;
    });

    loop {
        match events.recv().await {
            Some(EngineEvent::Status(update)) => {
                print_engine_status(&update);
                match update.status {
                    ConnectionStatus::Connected => break,
                    ConnectionStatus::Error => bail!("{}", update.message),
                    _ => {}
                }
            }
            Some(_) => {}
            None => bail!("Engine stopped before connecting"),
        }
    }

    let handle = engine.start(request)?;
    terminal::print_status("Recipients", &handle.total.to_string());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                terminal::print_warn("Stopping after the current recipient...");
                engine.stop();
            }
            event = events.recv() => match event {
                Some(EngineEvent::Progress(progress)) => print_progress(&progress),
                Some(EngineEvent::Status(update)) => {
                    print_engine_status(&update);
                    if matches!(update.status, ConnectionStatus::Finished | ConnectionStatus::Error) {
                        break;
                    }
                }
                Some(EngineEvent::Qr { .. }) => {}
                None => break,
            },
        }
    }

    let report = handle.wait().await;
    engine.shutdown().await?;

    let Some(report) = report else {
        bail!("Broadcast ended without a report");
    };
    terminal::print_status("Delivered", &report.result.success_count.to_string());
    terminal::print_status("Failed", &report.result.error_count.to_string());
    terminal::print_status(
        "Skipped",
        &(report.total - report.result.attempted()).to_string(),
    );
    if report.outcome == RunOutcome::Faulted {
        bail!("Broadcast aborted unexpectedly");
    }
    terminal::print_goodbye();
    Ok(())
}

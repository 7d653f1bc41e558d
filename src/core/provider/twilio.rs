use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::{info, warn};

use super::{MessagingProvider, ProviderEventSink};
use crate::core::broadcast::error::SendError;
use crate::core::broadcast::payload::{OutboundMessage, TemplateAction, TemplateButton};
use crate::core::config::TwilioConfig;

/// Sends through the Twilio WhatsApp REST API. Sessions are account-bound,
/// so there is never a pairing step.
pub struct TwilioProvider {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
    api_base: String,
}

impl TwilioProvider {
    pub fn new(config: TwilioConfig) -> Result<Self> {
        if config.account_sid.trim().is_empty()
            || config.auth_token.trim().is_empty()
            || config.from_number.trim().is_empty()
        {
            bail!("account_sid, auth_token, and from_number are all required for the twilio provider.");
        }
        Ok(Self {
            client: reqwest::Client::new(),
            account_sid: config.account_sid.trim().to_string(),
            auth_token: config.auth_token.trim().to_string(),
            from: whatsapp_address(&config.from_number),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}.json", self.api_base, self.account_sid)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

/// Twilio expects the WhatsApp prefix on numbers.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else if number.starts_with('+') {
        format!("whatsapp:{}", number)
    } else {
        format!("whatsapp:+{}", number)
    }
}

fn button_line(button: &TemplateButton) -> String {
    match &button.action {
        TemplateAction::QuickReply { .. } => format!("{}. {}", button.index, button.display_text),
        TemplateAction::Url { url } => {
            format!("{}. {}: {}", button.index, button.display_text, url)
        }
        TemplateAction::Call { phone_number } => {
            format!("{}. {}: {}", button.index, button.display_text, phone_number)
        }
    }
}

/// Plain-text rendering for channels without interactive templates.
pub fn render_body(message: &OutboundMessage) -> String {
    let (text, footer, buttons) = match message {
        OutboundMessage::Text { text } => (text.as_str(), None, &[][..]),
        OutboundMessage::Buttons {
            text,
            footer,
            buttons,
        } => (text.as_str(), Some(footer.as_str()), buttons.as_slice()),
        OutboundMessage::Image {
            caption,
            footer,
            buttons,
            ..
        } => (caption.as_str(), footer.as_deref(), buttons.as_slice()),
    };

    let mut lines = vec![text.to_string()];
    if !buttons.is_empty() {
        lines.push(String::new());
        lines.extend(buttons.iter().map(button_line));
    }
    if let Some(footer) = footer.filter(|f| !f.is_empty()) {
        lines.push(String::new());
        lines.push(format!("_{}_", footer));
    }
    lines.join("\n")
}

#[async_trait]
impl MessagingProvider for TwilioProvider {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn connect(&self, sink: ProviderEventSink) -> Result<()> {
        let resp = self
            .client
            .get(self.account_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Twilio API error ({}): {}", status, body);
        }

        info!("Twilio account {} verified", self.account_sid);
        sink.opening();
        Ok(())
    }

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), SendError> {
        if let OutboundMessage::Image { .. } = message {
            return Err(SendError::new(
                "image broadcasts are not supported by the Twilio REST provider",
            ));
        }

        let to = whatsapp_address(recipient);
        let body = render_body(message);
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from.as_str()), ("To", &to), ("Body", &body)])
            .send()
            .await
            .map_err(|e| SendError::new(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let detail = resp.text().await.unwrap_or_default();
        warn!("Twilio rejected message to {}: {}", to, status);
        Err(SendError::new(format!(
            "Twilio API error ({}): {}",
            status, detail
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broadcast::payload::build_message;
    use crate::core::broadcast::types::{BroadcastRequest, Button, ImagePayload};
    use crate::core::provider::ProviderEvent;
    use axum::extract::{Form, Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn mock_twilio() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));

        async fn account(Path(file): Path<String>) -> StatusCode {
            if file == "AC123.json" {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            }
        }

        async fn messages(
            State(captured): State<Captured>,
            Form(form): Form<HashMap<String, String>>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            let reject = form.get("To").is_some_and(|to| to.ends_with("000000"));
            captured.lock().unwrap().push(form);
            if reject {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "message": "invalid number" })),
                )
            } else {
                (StatusCode::CREATED, Json(serde_json::json!({ "sid": "SM1" })))
            }
        }

        let app = Router::new()
            .route("/2010-04-01/Accounts/{file}", get(account))
            .route("/2010-04-01/Accounts/AC123/Messages.json", post(messages))
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn config(api_base: &str, sid: &str) -> TwilioConfig {
        TwilioConfig {
            account_sid: sid.to_string(),
            auth_token: "token".to_string(),
            from_number: "+14155238886".to_string(),
            api_base: api_base.to_string(),
        }
    }

    #[test]
    fn requires_credentials() {
        let mut cfg = config("http://localhost", "AC123");
        cfg.auth_token = " ".to_string();
        assert!(TwilioProvider::new(cfg).is_err());
    }

    #[test]
    fn addresses_get_whatsapp_prefix() {
        assert_eq!(whatsapp_address("628123456"), "whatsapp:+628123456");
        assert_eq!(whatsapp_address("+14155238886"), "whatsapp:+14155238886");
        assert_eq!(whatsapp_address("whatsapp:+1415"), "whatsapp:+1415");
    }

    #[test]
    fn buttons_and_footer_render_as_text() {
        let request = BroadcastRequest::new(vec!["628123456".into()], "Promo today")
            .with_footer("Reply STOP to opt out")
            .with_buttons(vec![
                Button::reply("Interested"),
                Button::url("", "https://x.test"),
                Button::url("Shop", "https://shop.test"),
            ]);
        let body = render_body(&build_message(&request, "1"));
        assert_eq!(
            body,
            "Promo today\n\n1. Interested\n3. Shop: https://shop.test\n\n_Reply STOP to opt out_"
        );
    }

    #[tokio::test]
    async fn connect_reports_opening_for_valid_account() {
        let (base, _) = mock_twilio().await;
        let provider = TwilioProvider::new(config(&base, "AC123")).unwrap();
        let (sink, mut rx) = ProviderEventSink::channel();
        provider.connect(sink).await.unwrap();
        assert_eq!(rx.recv().await, Some(ProviderEvent::Opening));
    }

    #[tokio::test]
    async fn connect_with_bad_credentials_fails_without_opening() {
        let (base, _) = mock_twilio().await;
        let provider = TwilioProvider::new(config(&base, "AC999")).unwrap();
        let (sink, mut rx) = ProviderEventSink::channel();
        let err = provider.connect(sink).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_posts_form_and_surfaces_api_errors() {
        let (base, captured) = mock_twilio().await;
        let provider = TwilioProvider::new(config(&base, "AC123")).unwrap();
        let message = OutboundMessage::Text {
            text: "hello".to_string(),
        };

        provider.send("628123456", &message).await.unwrap();
        let err = provider.send("628000000", &message).await.unwrap_err();
        assert!(err.reason.contains("400"));

        let forms = captured.lock().unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0]["From"], "whatsapp:+14155238886");
        assert_eq!(forms[0]["To"], "whatsapp:+628123456");
        assert_eq!(forms[0]["Body"], "hello");
    }

    #[tokio::test]
    async fn image_messages_fail_per_recipient() {
        let provider = TwilioProvider::new(config("http://127.0.0.1:9", "AC123")).unwrap();
        let request = BroadcastRequest::new(vec!["628123456".into()], "caption")
            .with_image(ImagePayload::new(vec![1, 2, 3], "image/png"));
        let err = provider
            .send("628123456", &build_message(&request, "1"))
            .await
            .unwrap_err();
        assert!(err.reason.contains("not supported"));
    }
}

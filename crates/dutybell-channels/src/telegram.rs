//! Telegram Bot channel — message sending and credential probing via the Bot API.

use async_trait::async_trait;
use dutybell_core::config::TelegramConfig;
use dutybell_core::error::{DutyBellError, Result};
use dutybell_core::traits::{DeliveryReport, Notifier, ProbeStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONFIG_MISSING: &str = "Config missing";

/// Telegram channel bound to one destination chat.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        if !self.config.is_configured() {
            return None;
        }
        Some((
            self.config.bot_token.as_deref()?.trim(),
            self.config.channel_id.as_deref()?.trim(),
        ))
    }

    fn api_url(&self, bot_token: &str, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            bot_token,
            method
        )
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }

    /// Send an HTML-formatted message to the configured destination.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let (bot_token, chat_id) = self
            .credentials()
            .ok_or_else(|| DutyBellError::Config(CONFIG_MISSING.into()))?;

        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(self.api_url(bot_token, "sendMessage"))
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let raw = response.text().await.map_err(transport_error)?;

        match serde_json::from_str::<TelegramApiResponse<serde_json::Value>>(&raw) {
            Ok(result) if result.ok => Ok(()),
            Ok(result) => Err(DutyBellError::Channel(
                result
                    .description
                    .unwrap_or_else(|| format!("Telegram API error {status}")),
            )),
            Err(_) => Err(DutyBellError::Channel(format!(
                "Telegram API error {status}: {raw}"
            ))),
        }
    }

    fn probe_token(&self) -> Option<&str> {
        self.config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    async fn fetch_me(
        &self,
        bot_token: &str,
    ) -> std::result::Result<TelegramApiResponse<TelegramUser>, reqwest::Error> {
        let response = self
            .client
            .get(self.api_url(bot_token, "getMe"))
            .timeout(self.timeout())
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        response.json().await.map_err(reqwest::Error::without_url)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> DeliveryReport {
        match self.send_message(text).await {
            Ok(()) => DeliveryReport::sent(),
            Err(DutyBellError::Config(msg)) => {
                tracing::error!("Telegram configuration missing");
                DeliveryReport::failed(msg)
            }
            Err(DutyBellError::Channel(msg)) => {
                tracing::warn!("Telegram API error: {msg}");
                DeliveryReport::failed(msg)
            }
            Err(e) => DeliveryReport::failed(e.to_string()),
        }
    }

    async fn probe(&self) -> ProbeStatus {
        let Some(bot_token) = self.probe_token() else {
            return ProbeStatus::ConfigMissing;
        };
        match self.fetch_me(bot_token).await {
            Ok(body) if body.ok => {
                let username = body.result.and_then(|me| me.username);
                tracing::debug!(
                    "Telegram bot reachable: @{}",
                    username.as_deref().unwrap_or("unknown")
                );
                ProbeStatus::Connected
            }
            Ok(_) => ProbeStatus::AuthFailed,
            Err(e) => {
                tracing::warn!("Telegram probe failed: {e}");
                ProbeStatus::Failed
            }
        }
    }
}

/// Transport failure text without the request URL, which embeds the bot token.
fn transport_error(e: reqwest::Error) -> DutyBellError {
    DutyBellError::Channel(e.without_url().to_string())
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::{get, post}};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Start a stand-in for the Bot API on an ephemeral port.
    async fn fake_bot_api() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));

        async fn ok_send(
            State(captured): State<Captured>,
            Json(body): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            captured.lock().unwrap().push(body);
            Json(serde_json::json!({"ok": true, "result": {"message_id": 1}}))
        }

        async fn rejected_send() -> (axum::http::StatusCode, Json<serde_json::Value>) {
            (
                axum::http::StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: chat not found"
                })),
            )
        }

        async fn slow_send() -> Json<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(serde_json::json!({"ok": true}))
        }

        async fn ok_get_me() -> Json<serde_json::Value> {
            Json(serde_json::json!({
                "ok": true,
                "result": {"id": 42, "is_bot": true, "first_name": "Bell", "username": "duty_bot"}
            }))
        }

        async fn unauthorized_get_me() -> (axum::http::StatusCode, Json<serde_json::Value>) {
            (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
            )
        }

        let app = Router::new()
            .route("/botGOOD/sendMessage", post(ok_send))
            .route("/botGOOD/getMe", get(ok_get_me))
            .route("/botREJECT/sendMessage", post(rejected_send))
            .route("/botREJECT/getMe", get(unauthorized_get_me))
            .route("/botSLOW/sendMessage", post(slow_send))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn notifier(api_base: &str, token: Option<&str>, channel: Option<&str>) -> TelegramNotifier {
        TelegramNotifier::new(TelegramConfig {
            bot_token: token.map(String::from),
            channel_id: channel.map(String::from),
            api_base: api_base.to_string(),
            timeout_secs: 1,
        })
    }

    #[tokio::test]
    async fn test_send_success_uses_html_payload() {
        let (base, captured) = fake_bot_api().await;
        let tg = notifier(&base, Some("GOOD"), Some("-100123"));

        let report = tg.send("<b>hello</b>").await;
        assert!(report.success);
        assert!(report.error.is_none());

        let bodies = captured.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["chat_id"], "-100123");
        assert_eq!(bodies[0]["text"], "<b>hello</b>");
        assert_eq!(bodies[0]["parse_mode"], "HTML");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_closed() {
        let (base, captured) = fake_bot_api().await;

        let no_token = notifier(&base, None, Some("-100123"));
        let report = no_token.send("x").await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some(CONFIG_MISSING));

        let no_channel = notifier(&base, Some("GOOD"), Some(""));
        assert!(!no_channel.send("x").await.success);

        // Nothing reached the provider.
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_rejection_text_is_verbatim() {
        let (base, _) = fake_bot_api().await;
        let tg = notifier(&base, Some("REJECT"), Some("-1"));

        let report = tg.send("x").await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("Bad Request: chat not found"));
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        let tg = notifier("http://127.0.0.1:1", Some("GOOD"), Some("-1"));
        let report = tg.send("x").await;
        assert!(!report.success);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_transport_error_hides_bot_token() {
        let tg = notifier("http://127.0.0.1:1", Some("123456:SECRET-TOKEN"), Some("-1"));
        let report = tg.send("x").await;
        let error = report.error.unwrap();
        assert!(!error.contains("SECRET-TOKEN"), "token leaked: {error}");
        assert!(!error.contains("/bot"), "url leaked: {error}");
    }

    #[tokio::test]
    async fn test_timeout_error_hides_bot_token() {
        let (base, _) = fake_bot_api().await;
        let tg = notifier(&base, Some("SLOW"), Some("-1"));
        let error = tg.send("x").await.error.unwrap();
        assert!(!error.contains("botSLOW"), "url leaked: {error}");
    }

    #[tokio::test]
    async fn test_send_is_bounded_by_timeout() {
        let (base, _) = fake_bot_api().await;
        let tg = notifier(&base, Some("SLOW"), Some("-1"));

        let started = std::time::Instant::now();
        let report = tg.send("x").await;
        assert!(!report.success);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_probe_states() {
        let (base, _) = fake_bot_api().await;

        assert_eq!(notifier(&base, Some("GOOD"), None).probe().await, ProbeStatus::Connected);
        assert_eq!(notifier(&base, Some("REJECT"), None).probe().await, ProbeStatus::AuthFailed);
        assert_eq!(notifier(&base, None, None).probe().await, ProbeStatus::ConfigMissing);
        assert_eq!(
            notifier("http://127.0.0.1:1", Some("GOOD"), None).probe().await,
            ProbeStatus::Failed
        );
    }

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let tg = notifier("https://api.telegram.org/", Some("T"), Some("C"));
        assert_eq!(
            tg.api_url("T", "sendMessage"),
            "https://api.telegram.org/botT/sendMessage"
        );
    }
}

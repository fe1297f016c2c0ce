use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::format::{Button, ButtonAction, ReplyEntry};

const TELEGRAM_BASE: &str = "https://api.telegram.org";
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Chat transport used by the bot: deliver replies, acknowledge button
/// presses, and pull updates when not running behind a webhook.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, chat_id: i64, message: &ReplyEntry) -> Result<()>;
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Flood-control rejection (HTTP 429). Callers may retry after the given
/// number of seconds.
#[derive(Debug, thiserror::Error)]
#[error("Telegram {method} rate limited, retry after {retry_after}s")]
pub struct RateLimited {
    pub method: String,
    pub retry_after: u64,
}

/// Bot API `reply_markup` with one button per row.
pub fn inline_keyboard(buttons: &[Button]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|b| {
            let button = match &b.action {
                ButtonAction::Url(url) => json!({ "text": b.label, "url": url }),
                ButtonAction::Callback(data) => json!({ "text": b.label, "callback_data": data }),
            };
            json!([button])
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

pub fn send_message_body(chat_id: i64, message: &ReplyEntry) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": message.text,
        "parse_mode": "HTML",
    });
    if !message.buttons.is_empty() {
        body["reply_markup"] = inline_keyboard(&message.buttons);
    }
    body
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, TELEGRAM_BASE)
    }

    pub fn with_base_url(token: &str, base: &str) -> Result<Self> {
        // Long polling holds requests open for up to a minute.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("Failed to read Telegram {} body", method))?;
        let parsed: ApiResponse<T> = serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Failed to parse Telegram {} response (status {}): {}",
                method,
                status,
                String::from_utf8_lossy(&bytes)
            )
        })?;
        if !parsed.ok {
            if let Some(retry_after) = parsed.parameters.and_then(|p| p.retry_after) {
                return Err(RateLimited {
                    method: method.to_string(),
                    retry_after,
                }
                .into());
            }
            return Err(anyhow!(
                "Telegram {} error (status {}): {}",
                method,
                status,
                parsed.description.unwrap_or_default()
            ));
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("Telegram {} returned no result", method))
    }

    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<()> {
        let body = json!({
            "url": url,
            "secret_token": secret,
            "allowed_updates": ["message", "callback_query"],
        });
        let _: bool = self.call("setWebhook", &body).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self.call("deleteWebhook", &json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for TelegramClient {
    async fn send_message(&self, chat_id: i64, message: &ReplyEntry) -> Result<()> {
        let body = send_message_body(chat_id, message);
        let _: Value = self.call("sendMessage", &body).await?;
        debug!(chat_id, "Sent message");
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = json!({ "callback_query_id": callback_id });
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }
}

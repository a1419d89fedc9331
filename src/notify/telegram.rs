// src/notify/telegram.rs
// Telegram Bot API client: alert delivery and chat replies

use crate::alerts::dispatcher::MessageSender;
use crate::bot::handler::ChatTransport;
use crate::bot::router::Reply;
use crate::domain::errors::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request};
use hyper_tls::HttpsConnector;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

pub struct TelegramClient {
    http_client: Client<HttpsConnector<HttpConnector>, Body>,
    // carries the bot token: never log it
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        Self::with_api_url(DEFAULT_API_URL, bot_token)
    }

    /// Point at a self-hosted Bot API server
    pub fn with_api_url(api_url: &str, bot_token: &str) -> Self {
        Self {
            http_client: Client::builder().build::<_, Body>(HttpsConnector::new()),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
        }
    }

    /// Register `url` as the webhook receiving updates
    pub async fn set_webhook(&self, url: &str) -> DeliveryResult<()> {
        self.call("setWebhook", &json!({ "url": url })).await?;
        Ok(())
    }

    /// Remove any webhook so long-polling can be used
    pub async fn delete_webhook(&self) -> DeliveryResult<()> {
        self.call("deleteWebhook", &json!({})).await?;
        Ok(())
    }

    async fn call(&self, method: &str, payload: &Value) -> DeliveryResult<Value> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/{}", self.base_url, method))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .map_err(|e| DeliveryError::Network(format!("Failed to build {} request: {}", method, e)))?;

        let response = self
            .http_client
            .request(request)
            .await
            .map_err(|e| DeliveryError::Network(format!("{} failed: {}", method, e)))?;

        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| DeliveryError::Network(format!("{} response: {}", method, e)))?;

        Self::parse_response(status.as_u16(), &body)
    }

    fn parse_response(status: u16, body: &[u8]) -> DeliveryResult<Value> {
        let parsed: ApiResponse = serde_json::from_slice(body).map_err(|e| {
            DeliveryError::InvalidResponse(format!("HTTP {}: {}", status, e))
        })?;

        if !parsed.ok {
            return Err(DeliveryError::Api {
                status: parsed.error_code.unwrap_or(status),
                description: parsed
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
                retry_after: parsed.parameters.and_then(|p| p.retry_after),
            });
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn keyboard_markup(reply: &Reply) -> Value {
        let rows: Vec<Value> = reply
            .keyboard
            .iter()
            .map(|row| {
                Value::Array(
                    row.iter()
                        .map(|button| json!({ "text": button.label, "callback_data": button.data }))
                        .collect(),
                )
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn message_payload(chat_id: Value, reply: &Reply) -> Value {
        let mut payload = json!({ "chat_id": chat_id, "text": reply.text });
        if !reply.keyboard.is_empty() {
            payload["reply_markup"] = Self::keyboard_markup(reply);
        }
        payload
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send_text(&self, destination: &str, text: &str) -> DeliveryResult<()> {
        self.call("sendMessage", &json!({ "chat_id": destination, "text": text }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn reply(&self, chat_id: i64, reply: &Reply) -> DeliveryResult<()> {
        self.call("sendMessage", &Self::message_payload(json!(chat_id), reply))
            .await?;
        Ok(())
    }

    async fn edit(&self, chat_id: i64, message_id: i64, reply: &Reply) -> DeliveryResult<()> {
        let mut payload = Self::message_payload(json!(chat_id), reply);
        payload["message_id"] = json!(message_id);
        self.call("editMessageText", &payload).await?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> DeliveryResult<()> {
        self.call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn updates(&self, offset: i64, timeout_secs: u64) -> DeliveryResult<Vec<Value>> {
        let result = self
            .call(
                "getUpdates",
                &json!({ "offset": offset, "timeout": timeout_secs, "allowed_updates": ["message", "callback_query"] }),
            )
            .await?;

        match result {
            Value::Array(updates) => Ok(updates),
            other => Err(DeliveryError::InvalidResponse(format!(
                "getUpdates returned {}",
                other
            ))),
        }
    }
}

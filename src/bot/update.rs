// src/bot/update.rs
// Parsing boundary for inbound Telegram updates

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    chat: RawChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawCallbackQuery {
    id: String,
    message: Option<RawMessage>,
    data: Option<String>,
}

/// A user action the bot knows how to answer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// `/name arg1 arg2`, name lower-cased and stripped of any `@bot` suffix
    Command { name: String, args: Vec<String> },
    /// Inline keyboard press on an earlier bot message
    ButtonPress {
        callback_id: String,
        message_id: i64,
        data: String,
    },
    PlainText(String),
}

/// Parse one update. `Ok(None)` for update types the bot ignores
/// (edited messages, stickers, buttons on vanished messages...).
pub fn parse_update(value: Value) -> Result<Option<InboundUpdate>, serde_json::Error> {
    let raw: RawUpdate = serde_json::from_value(value)?;
    Ok(convert(raw))
}

pub fn parse_update_bytes(body: &[u8]) -> Result<Option<InboundUpdate>, serde_json::Error> {
    let raw: RawUpdate = serde_json::from_slice(body)?;
    Ok(convert(raw))
}

fn convert(raw: RawUpdate) -> Option<InboundUpdate> {
    let update_id = raw.update_id;

    if let Some(query) = raw.callback_query {
        let message = query.message?;
        return Some(InboundUpdate {
            update_id,
            chat_id: message.chat.id,
            kind: UpdateKind::ButtonPress {
                callback_id: query.id,
                message_id: message.message_id,
                data: query.data.unwrap_or_default(),
            },
        });
    }

    let message = raw.message?;
    let text = message.text?.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let kind = match text.strip_prefix('/') {
        Some(command) => {
            let mut parts = command.split_whitespace();
            let head = parts.next().unwrap_or_default();
            let name = head.split('@').next().unwrap_or_default().to_lowercase();
            UpdateKind::Command {
                name,
                args: parts.map(str::to_string).collect(),
            }
        }
        None => UpdateKind::PlainText(text),
    };

    Some(InboundUpdate {
        update_id,
        chat_id: message.chat.id,
        kind,
    })
}

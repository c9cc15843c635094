//! The slice of the Bot API the webhook reads and answers with.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_owned(),
            callback_data: callback_data.to_owned(),
        }
    }
}

/// A Bot API method call returned as the webhook response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method")]
pub enum BotReply {
    #[serde(rename = "sendMessage")]
    SendMessage {
        chat_id: i64,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parse_mode: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_markup: Option<InlineKeyboard>,
    },
    #[serde(rename = "editMessageText")]
    EditMessageText {
        chat_id: i64,
        message_id: i64,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parse_mode: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_markup: Option<InlineKeyboard>,
    },
}

impl BotReply {
    pub fn text(&self) -> &str {
        match self {
            Self::SendMessage { text, .. } | Self::EditMessageText { text, .. } => text,
        }
    }

    pub fn keyboard(&self) -> Option<&InlineKeyboard> {
        match self {
            Self::SendMessage { reply_markup, .. } | Self::EditMessageText { reply_markup, .. } => {
                reply_markup.as_ref()
            }
        }
    }
}

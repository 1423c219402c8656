//! Inbound update wire types and classification
//!
//! The chat provider delivers updates as opaque JSON payloads; these are
//! the minimal serde shapes the bot cares about, plus the classification
//! into the three routes the dispatcher knows: command, free text,
//! callback.

use serde::{Deserialize, Serialize};

/// One webhook update from the chat provider
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// An inbound chat message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: User,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// The sender of a message or callback
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// The chat a message belongs to
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A button press on an inline keyboard
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// One inline keyboard button
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to an outbound message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Keyboard with one row of buttons
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            inline_keyboard: vec![buttons],
        }
    }

    /// Add a row of buttons
    pub fn push_row(&mut self, buttons: Vec<InlineButton>) {
        self.inline_keyboard.push(buttons);
    }
}

/// A classified inbound update
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `/name args` message
    Command {
        user_id: i64,
        chat_id: i64,
        name: String,
        args: String,
    },
    /// Plain text message
    Text { user_id: i64, chat_id: i64, text: String },
    /// Inline button press; `data` is the raw callback payload
    Callback {
        user_id: i64,
        chat_id: i64,
        data: String,
    },
}

/// Classify an update into its dispatch route
///
/// Returns `None` for updates the bot has nothing to do with (no text, no
/// callback data, callback without an originating chat).
pub fn classify(update: &Update) -> Option<Inbound> {
    if let Some(callback) = &update.callback_query {
        let chat_id = callback.message.as_ref().map(|m| m.chat.id)?;
        let data = callback.data.clone()?;
        return Some(Inbound::Callback {
            user_id: callback.from.id,
            chat_id,
            data,
        });
    }

    let message = update.message.as_ref()?;
    let text = message.text.as_ref()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(rest) = text.strip_prefix('/') {
        let (raw_name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        // strip a bot-mention suffix: "/list@nudge_bot" -> "list"
        let name = raw_name.split('@').next().unwrap_or(raw_name);
        if name.is_empty() {
            return None;
        }
        return Some(Inbound::Command {
            user_id: message.from.id,
            chat_id: message.chat.id,
            name: name.to_lowercase(),
            args: args.to_string(),
        });
    }

    Some(Inbound::Text {
        user_id: message.from.id,
        chat_id: message.chat.id,
        text: text.to_string(),
    })
}

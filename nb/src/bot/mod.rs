//! Chat-facing layer
//!
//! Update decoding and classification, per-user session state, the
//! callback-data codec, and the [`ChatService`] that ties them to the bus.

mod callback;
mod service;
mod session;
mod update;

pub use callback::{CallbackData, MAX_CALLBACK_BYTES};
pub use service::ChatService;
pub use session::{ChatState, SessionManager, TaskDraft, spawn_session_sweeper};
pub use update::{CallbackQuery, Chat, Inbound, InlineButton, InlineKeyboard, Message, Update, User, classify};

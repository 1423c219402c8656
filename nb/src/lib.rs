//! Nudgebot - task-reminder chat assistant
//!
//! Users message a bot, natural-language text becomes tasks, and a
//! background scheduler nudges them when tasks fall due. The interesting
//! part is the event-driven core: the chat-facing, parsing and
//! task-repository services are decoupled behind an in-process pub/sub
//! bus, with subscription lifecycle management keeping the topology
//! correct under partial startup failure.
//!
//! # Modules
//!
//! - [`events`] - topic-keyed event bus, event types, subscription manager
//! - [`scheduler`] - due-task polling loop and worker pool
//! - [`bot`] - update classification, sessions, callback codec, chat service
//! - [`parser`] - natural-language due-time parsing service
//! - [`repo`] - task-repository service
//! - [`transport`] - outbound messenger and webhook listener
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod bot;
pub mod cli;
pub mod config;
pub mod events;
pub mod parser;
pub mod repo;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use bot::{CallbackData, ChatService, ChatState, SessionManager, spawn_session_sweeper};
pub use config::{BusConfig, ChatConfig, Config, SessionConfig, StorageConfig};
pub use events::{
    BackoffPolicy, BusError, DispatchMode, Event, EventBus, EventHandler, EventPayload, ManagerState, Subscription,
    SubscriptionError, SubscriptionManager, TaskAction, Topic,
};
pub use parser::{ParseError, ParsedTask, ParserService, parse_task};
pub use repo::TaskService;
pub use scheduler::{CycleStats, ReminderScheduler, RunState, SchedulerConfig, SchedulerError};
pub use transport::{BotApi, Messenger};

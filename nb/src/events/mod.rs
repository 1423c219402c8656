//! Event-driven orchestration core
//!
//! The chat-facing, parsing and task-repository services never call each
//! other; they exchange [`Event`]s over an in-process [`EventBus`] keyed by
//! [`Topic`]. The scheduler drives the same bus with reminder events.
//!
//! # Architecture
//!
//! ```text
//!  webhook bytes        poll tick
//!       │                   │
//!  ┌────▼─────┐       ┌─────▼─────┐
//!  │   chat   │       │ scheduler │
//!  │ service  │       └─────┬─────┘
//!  └────┬─────┘             │ reminder.due / reminder.nudge
//!       │ message.received  │
//!  ┌────▼───────────────────▼────┐
//!  │          EVENT BUS          │
//!  │   topic → subscriber set    │
//!  └────┬──────────────────┬─────┘
//!       │ task.parsed      │ task.action.requested
//!  ┌────▼─────┐       ┌────▼─────┐
//!  │  parser  │       │   repo   │
//!  │ service  │       │ service  │
//!  └──────────┘       └──────────┘
//! ```
//!
//! Events are fire-and-forget: nothing is retained after dispatch, nothing
//! survives a restart, and delivery is best-effort in-process fan-out.
//!
//! Each service establishes its subscriptions through a
//! [`SubscriptionManager`], which retries with backoff at startup and
//! answers runtime health checks.

mod bus;
mod subscriptions;
mod types;

pub use bus::{
    BusError, DEFAULT_DISPATCH_WORKERS, DEFAULT_QUEUE_CAPACITY, DispatchMode, EventBus, EventHandler, Subscription,
};
pub use subscriptions::{BackoffPolicy, ManagerState, SubscribeTarget, SubscriptionError, SubscriptionManager};
pub use types::{ActionOutcome, Event, EventPayload, TaskAction, Topic};

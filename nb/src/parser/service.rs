//! Parsing service
//!
//! Consumes `message.received`, turns the text into a task draft and
//! publishes `task.parsed` or `task.parse_failed`. The correlation ID of
//! the inbound event is carried onto everything derived from it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::events::{Event, EventBus, EventHandler, EventPayload, SubscriptionError, SubscriptionManager, Topic};

use super::nl::parse_task;

/// Owns the message-parsing subscription
pub struct ParserService {
    bus: Arc<EventBus>,
    subscriptions: SubscriptionManager,
}

impl ParserService {
    /// Construct and wire the service; fails fast if the subscription
    /// cannot be established
    pub async fn new(bus: Arc<EventBus>) -> Result<Arc<Self>, SubscriptionError> {
        let service = Arc::new(Self {
            bus: Arc::clone(&bus),
            subscriptions: SubscriptionManager::new(bus),
        });

        let handler = Arc::new(ParserEvents(Arc::clone(&service)));
        service
            .subscriptions
            .establish(vec![(Topic::MessageReceived, handler)])
            .await?;

        Ok(service)
    }

    /// Health of this service's subscriptions
    pub fn check_health(&self) -> Result<(), SubscriptionError> {
        self.subscriptions.check_health()
    }

    async fn on_message(&self, event: &Event, user_id: i64, chat_id: i64, text: &str) -> eyre::Result<()> {
        let payload = match parse_task(text, Utc::now()) {
            Ok(parsed) => {
                debug!(user_id, description = %parsed.description, due_at = %parsed.due_at, "parsed task");
                EventPayload::TaskParsed {
                    user_id,
                    chat_id,
                    description: parsed.description,
                    due_at: parsed.due_at,
                }
            }
            Err(e) => {
                debug!(user_id, error = %e, "could not parse task");
                EventPayload::TaskParseFailed {
                    user_id,
                    chat_id,
                    text: text.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        self.bus.publish(Event::new(event.correlation_id.clone(), payload)).await?;
        Ok(())
    }
}

struct ParserEvents(Arc<ParserService>);

#[async_trait]
impl EventHandler for ParserEvents {
    async fn handle(&self, event: Event) -> eyre::Result<()> {
        match &event.payload {
            EventPayload::MessageReceived { user_id, chat_id, text } => {
                self.0.on_message(&event, *user_id, *chat_id, text).await
            }
            other => {
                debug!(topic = %other.topic(), "parser ignoring unexpected event");
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "parser-service"
    }
}

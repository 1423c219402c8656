//! Task-repository service
//!
//! Consumes `task.action.requested`, persists through the [`TaskStore`]
//! trait and reports back with `task.created` or `task.action.completed`.
//! Actions referencing a task that no longer exists resolve to a
//! `NotFound` outcome rather than an error - the chat service turns that
//! into a friendly reply.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use taskstore::{Task, TaskStatus, TaskStore};
use tracing::{debug, info};

use crate::events::{
    ActionOutcome, Event, EventBus, EventHandler, EventPayload, SubscriptionError, SubscriptionManager, TaskAction,
    Topic,
};

/// Owns the action subscription and the store writes
pub struct TaskService {
    bus: Arc<EventBus>,
    store: Arc<dyn TaskStore>,
    subscriptions: SubscriptionManager,
}

impl TaskService {
    /// Construct and wire the service; fails fast if the subscription
    /// cannot be established
    pub async fn new(bus: Arc<EventBus>, store: Arc<dyn TaskStore>) -> Result<Arc<Self>, SubscriptionError> {
        let service = Arc::new(Self {
            bus: Arc::clone(&bus),
            store,
            subscriptions: SubscriptionManager::new(bus),
        });

        let handler = Arc::new(TaskEvents(Arc::clone(&service)));
        service
            .subscriptions
            .establish(vec![(Topic::TaskActionRequested, handler)])
            .await?;

        Ok(service)
    }

    /// Health of this service's subscriptions
    pub fn check_health(&self) -> Result<(), SubscriptionError> {
        self.subscriptions.check_health()
    }

    async fn on_action(&self, event: &Event, user_id: i64, chat_id: i64, action: &TaskAction) -> eyre::Result<()> {
        match action {
            TaskAction::Create { description, due_at } => {
                let task = Task::new(chat_id, user_id, description.clone(), *due_at);
                self.store.create(&task)?;
                info!(task_id = %task.id, chat_id, "task created");
                self.publish(event, EventPayload::TaskCreated { task }).await
            }
            TaskAction::Complete { task_id } => {
                let outcome = match self.store.get(task_id)? {
                    Some(task) => {
                        self.store.update_status(task_id, TaskStatus::Completed)?;
                        ActionOutcome::Completed {
                            description: task.description,
                        }
                    }
                    None => ActionOutcome::NotFound,
                };
                self.report(event, chat_id, action, Some(task_id.clone()), outcome).await
            }
            TaskAction::Delete { task_id } => {
                let outcome = match self.store.get(task_id)? {
                    Some(task) => {
                        self.store.delete(task_id)?;
                        ActionOutcome::Deleted {
                            description: task.description,
                        }
                    }
                    None => ActionOutcome::NotFound,
                };
                self.report(event, chat_id, action, Some(task_id.clone()), outcome).await
            }
            TaskAction::Snooze { task_id, minutes } => {
                let outcome = match self.store.get(task_id)? {
                    Some(task) => {
                        let until = Utc::now() + Duration::minutes(*minutes);
                        self.store.reschedule(task_id, until)?;
                        ActionOutcome::Snoozed {
                            description: task.description,
                            until,
                        }
                    }
                    None => ActionOutcome::NotFound,
                };
                self.report(event, chat_id, action, Some(task_id.clone()), outcome).await
            }
        }
    }

    async fn report(
        &self,
        event: &Event,
        chat_id: i64,
        action: &TaskAction,
        task_id: Option<String>,
        outcome: ActionOutcome,
    ) -> eyre::Result<()> {
        debug!(?task_id, action = action.name(), ?outcome, "action handled");
        self.publish(
            event,
            EventPayload::TaskActionCompleted {
                chat_id,
                action: action.name().to_string(),
                task_id,
                outcome,
            },
        )
        .await
    }

    async fn publish(&self, event: &Event, payload: EventPayload) -> eyre::Result<()> {
        self.bus.publish(Event::new(event.correlation_id.clone(), payload)).await?;
        Ok(())
    }
}

struct TaskEvents(Arc<TaskService>);

#[async_trait]
impl EventHandler for TaskEvents {
    async fn handle(&self, event: Event) -> eyre::Result<()> {
        match &event.payload {
            EventPayload::TaskActionRequested {
                user_id,
                chat_id,
                action,
            } => self.0.on_action(&event, *user_id, *chat_id, action).await,
            other => {
                debug!(topic = %other.topic(), "task service ignoring unexpected event");
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "task-service"
    }
}

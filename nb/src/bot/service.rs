//! Chat-facing service
//!
//! Owns the webhook entry point and the user-visible half of every flow:
//! commands, free text, inline-button callbacks, confirmations, reminders.
//! Internal failures surface to the user as chat messages (or silence, for
//! reminders that retry next poll) - never as a transport-level failure;
//! the listener acknowledges every update regardless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Context;
use taskstore::{Task, TaskStatus, TaskStore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{
    ActionOutcome, Event, EventBus, EventHandler, EventPayload, SubscriptionError, SubscriptionManager, TaskAction,
    Topic,
};
use crate::transport::Messenger;

use super::callback::CallbackData;
use super::session::{ChatState, SessionManager, TaskDraft};
use super::update::{InlineButton, InlineKeyboard, Inbound, Update, classify};

// callback actions
const ACT_CONFIRM: &str = "confirm";
const ACT_DISCARD: &str = "discard";
const ACT_DONE: &str = "done";
const ACT_DELETE: &str = "del";
const ACT_SNOOZE: &str = "snooze";

// callback argument keys
const ARG_TASK: &str = "t";
const ARG_MINUTES: &str = "m";

const DEFAULT_SNOOZE_MINUTES: i64 = 15;

/// Tasks shown per /list to keep the keyboard manageable
const LIST_LIMIT: usize = 10;

const HELP_TEXT: &str = "I turn your messages into reminders.\n\n\
    Just tell me what and when: \"call mum tomorrow at 6pm\" or\n\
    \"take the bread out in 25 minutes\".\n\n\
    /add - add a task\n\
    /list - show and manage open tasks\n\
    /cancel - forget what we were doing\n\
    /help - this message";

/// The chat-facing orchestrating service
pub struct ChatService {
    bus: Arc<EventBus>,
    store: Arc<dyn TaskStore>,
    messenger: Arc<dyn Messenger>,
    sessions: Arc<SessionManager>,
    subscriptions: SubscriptionManager,
}

impl ChatService {
    /// Construct and wire the service; fails fast if any required
    /// subscription cannot be established
    pub async fn new(
        bus: Arc<EventBus>,
        store: Arc<dyn TaskStore>,
        messenger: Arc<dyn Messenger>,
        sessions: Arc<SessionManager>,
    ) -> Result<Arc<Self>, SubscriptionError> {
        let service = Arc::new(Self {
            bus: Arc::clone(&bus),
            store,
            messenger,
            sessions,
            subscriptions: SubscriptionManager::new(bus),
        });

        let handler: Arc<dyn EventHandler> = Arc::new(ChatEvents(Arc::clone(&service)));
        service
            .subscriptions
            .establish(vec![
                (Topic::TaskParsed, Arc::clone(&handler)),
                (Topic::TaskParseFailed, Arc::clone(&handler)),
                (Topic::TaskCreated, Arc::clone(&handler)),
                (Topic::TaskActionCompleted, Arc::clone(&handler)),
                (Topic::ReminderDue, Arc::clone(&handler)),
                (Topic::ReminderNudge, handler),
            ])
            .await?;

        Ok(service)
    }

    /// Health of this service's subscriptions
    pub fn check_health(&self) -> Result<(), SubscriptionError> {
        self.subscriptions.check_health()
    }

    /// Entry point for raw webhook payloads
    ///
    /// Decodes, classifies and routes one update. Errors returned here are
    /// for logging only - the transport acknowledges receipt either way.
    pub async fn handle_webhook(&self, payload: &[u8]) -> eyre::Result<()> {
        let update: Update = serde_json::from_slice(payload).context("failed to decode webhook payload")?;

        let Some(inbound) = classify(&update) else {
            debug!(update_id = update.update_id, "ignoring update with nothing to dispatch");
            return Ok(());
        };

        // one correlation id per inbound update, carried across the chain
        let correlation_id = Uuid::now_v7().to_string();
        debug!(update_id = update.update_id, %correlation_id, "dispatching update");

        match inbound {
            Inbound::Command {
                user_id,
                chat_id,
                name,
                args,
            } => self.handle_command(&correlation_id, user_id, chat_id, &name, &args).await,
            Inbound::Text { user_id, chat_id, text } => {
                self.handle_text(&correlation_id, user_id, chat_id, &text).await
            }
            Inbound::Callback { user_id, chat_id, data } => {
                self.handle_callback(&correlation_id, user_id, chat_id, &data).await
            }
        }

        Ok(())
    }

    async fn handle_command(&self, correlation_id: &str, user_id: i64, chat_id: i64, name: &str, args: &str) {
        debug!(user_id, command = name, "handling command");
        self.sessions.touch(user_id);

        match name {
            "start" | "help" => self.send(chat_id, HELP_TEXT).await,
            "add" => {
                if args.is_empty() {
                    self.sessions.set_state(user_id, ChatState::AwaitingTask);
                    self.send(chat_id, "What should I remind you about? Include a time, like \"in 20 minutes\".")
                        .await;
                } else {
                    // task text supplied inline: straight to the parser
                    self.publish_message(correlation_id, user_id, chat_id, args).await;
                }
            }
            "list" => self.handle_list(user_id, chat_id).await,
            "cancel" => {
                self.sessions.clear(user_id);
                self.send(chat_id, "Okay, never mind.").await;
            }
            _ => {
                self.send(chat_id, "Unknown command. Try /help.").await;
            }
        }
    }

    async fn handle_list(&self, user_id: i64, chat_id: i64) {
        let tasks = match self.store.list_open(chat_id) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(chat_id, error = %e, "failed to list tasks");
                self.send(chat_id, "Something went wrong fetching your tasks, sorry.").await;
                return;
            }
        };

        if tasks.is_empty() {
            self.sessions.set_state(user_id, ChatState::Idle);
            self.send(chat_id, "No open tasks. Tell me about one!").await;
            return;
        }

        self.sessions.set_state(user_id, ChatState::ManagingTasks);

        let mut text = String::from("Your open tasks:\n");
        let mut keyboard = InlineKeyboard::default();
        for task in tasks.iter().take(LIST_LIMIT) {
            text.push_str(&format!("• {} (due {})\n", task.description, format_due(&task.due_at)));
            keyboard.push_row(vec![
                InlineButton::new(
                    format!("✓ {}", truncate(&task.description, 24)),
                    CallbackData::new(ACT_DONE).with_arg(ARG_TASK, &task.id).encode(),
                ),
                InlineButton::new("🗑", CallbackData::new(ACT_DELETE).with_arg(ARG_TASK, &task.id).encode()),
            ]);
        }
        if tasks.len() > LIST_LIMIT {
            text.push_str(&format!("…and {} more\n", tasks.len() - LIST_LIMIT));
        }

        self.send_with_keyboard(chat_id, &text, &keyboard).await;
    }

    async fn handle_text(&self, correlation_id: &str, user_id: i64, chat_id: i64, text: &str) {
        debug!(user_id, "handling free text");
        self.sessions.touch(user_id);
        self.publish_message(correlation_id, user_id, chat_id, text).await;
    }

    async fn handle_callback(&self, correlation_id: &str, user_id: i64, chat_id: i64, data: &str) {
        let callback = CallbackData::decode(data);
        debug!(user_id, action = %callback.action, "handling callback");
        self.sessions.touch(user_id);

        match callback.action.as_str() {
            ACT_CONFIRM => match self.sessions.take_draft(user_id) {
                Some(draft) => {
                    self.publish_action(
                        correlation_id,
                        user_id,
                        chat_id,
                        TaskAction::Create {
                            description: draft.description,
                            due_at: draft.due_at,
                        },
                    )
                    .await;
                }
                None => {
                    self.send(chat_id, "Nothing pending to confirm.").await;
                }
            },
            ACT_DISCARD => {
                self.sessions.clear(user_id);
                self.send(chat_id, "Okay, discarded.").await;
            }
            ACT_DONE => {
                if let Some(task_id) = self.require_task_arg(&callback, chat_id).await {
                    self.sessions.set_state(user_id, ChatState::Idle);
                    self.publish_action(correlation_id, user_id, chat_id, TaskAction::Complete { task_id })
                        .await;
                }
            }
            ACT_DELETE => {
                if let Some(task_id) = self.require_task_arg(&callback, chat_id).await {
                    self.sessions.set_state(user_id, ChatState::Idle);
                    self.publish_action(correlation_id, user_id, chat_id, TaskAction::Delete { task_id })
                        .await;
                }
            }
            ACT_SNOOZE => {
                if let Some(task_id) = self.require_task_arg(&callback, chat_id).await {
                    let minutes = callback
                        .arg(ARG_MINUTES)
                        .and_then(|m| m.parse().ok())
                        .unwrap_or(DEFAULT_SNOOZE_MINUTES);
                    self.publish_action(correlation_id, user_id, chat_id, TaskAction::Snooze { task_id, minutes })
                        .await;
                }
            }
            other => {
                debug!(action = other, "unrecognized callback action");
                self.send(chat_id, "I don't recognize that button, sorry.").await;
            }
        }
    }

    /// Fetch the task argument, answering the user if the payload was
    /// degraded below the wire cap and lost it
    async fn require_task_arg(&self, callback: &CallbackData, chat_id: i64) -> Option<String> {
        match callback.arg(ARG_TASK) {
            Some(task_id) => Some(task_id.to_string()),
            None => {
                self.send(chat_id, "That button has expired - try /list for a fresh one.").await;
                None
            }
        }
    }

    // === event handlers (bus side) ===

    async fn on_task_parsed(&self, user_id: i64, chat_id: i64, description: &str, due_at: DateTime<Utc>) {
        let draft = TaskDraft {
            description: description.to_string(),
            due_at,
        };
        self.sessions.set_state(user_id, ChatState::ConfirmingTask { draft });

        let keyboard = InlineKeyboard::single_row(vec![
            InlineButton::new("💾 Save", CallbackData::new(ACT_CONFIRM).encode()),
            InlineButton::new("✗ Discard", CallbackData::new(ACT_DISCARD).encode()),
        ]);
        let text = format!("Remind you to \"{}\" at {}?", description, format_due(&due_at));
        self.send_with_keyboard(chat_id, &text, &keyboard).await;
    }

    async fn on_parse_failed(&self, chat_id: i64, reason: &str) {
        let text = format!(
            "I couldn't turn that into a reminder ({reason}).\n\
             Try something like \"water the plants in 20 minutes\" or \"call mum tomorrow at 6pm\"."
        );
        self.send(chat_id, &text).await;
    }

    async fn on_task_created(&self, task: &Task) {
        let text = format!(
            "Saved! I'll remind you to \"{}\" at {}.",
            task.description,
            format_due(&task.due_at)
        );
        self.send(task.chat_id, &text).await;
    }

    async fn on_action_completed(&self, chat_id: i64, outcome: &ActionOutcome) {
        let text = match outcome {
            ActionOutcome::Completed { description } => format!("✓ Done: \"{description}\""),
            ActionOutcome::Deleted { description } => format!("Deleted \"{description}\"."),
            ActionOutcome::Snoozed { description, until } => {
                format!("Snoozed \"{}\" until {}.", description, format_due(until))
            }
            ActionOutcome::NotFound => "That task no longer exists.".to_string(),
        };
        self.send(chat_id, &text).await;
    }

    async fn on_reminder(&self, task: &Task, nudge: Option<i64>) {
        let text = match nudge {
            None => format!("⏰ Reminder: {}", task.description),
            Some(overdue_secs) => format!(
                "⏰ Still pending: {} (overdue {} min)",
                task.description,
                overdue_secs / 60
            ),
        };
        let keyboard = InlineKeyboard::single_row(vec![
            InlineButton::new("✓ Done", CallbackData::new(ACT_DONE).with_arg(ARG_TASK, &task.id).encode()),
            InlineButton::new(
                "💤 15 min",
                CallbackData::new(ACT_SNOOZE)
                    .with_arg(ARG_TASK, &task.id)
                    .with_arg(ARG_MINUTES, DEFAULT_SNOOZE_MINUTES.to_string())
                    .encode(),
            ),
        ]);

        if let Err(e) = self.messenger.send_message_with_keyboard(task.chat_id, &text, &keyboard).await {
            // leave the status untouched; the next poll cycle retries
            warn!(task_id = %task.id, error = %e, "failed to deliver reminder");
            return;
        }

        let status = if nudge.is_some() {
            TaskStatus::Nudged
        } else {
            TaskStatus::Reminded
        };
        if let Err(e) = self.store.update_status(&task.id, status) {
            // reminder went out but the status write failed: the store may
            // report this task as due again next cycle (duplicate reminder)
            warn!(task_id = %task.id, error = %e, "failed to record reminder status");
        }
    }

    // === helpers ===

    async fn publish_message(&self, correlation_id: &str, user_id: i64, chat_id: i64, text: &str) {
        let event = Event::new(
            correlation_id,
            EventPayload::MessageReceived {
                user_id,
                chat_id,
                text: text.to_string(),
            },
        );
        if let Err(e) = self.bus.publish(event).await {
            warn!(chat_id, error = %e, "failed to publish message event");
            self.send(chat_id, "Something went wrong, please try again.").await;
        }
    }

    async fn publish_action(&self, correlation_id: &str, user_id: i64, chat_id: i64, action: TaskAction) {
        let event = Event::new(
            correlation_id,
            EventPayload::TaskActionRequested {
                user_id,
                chat_id,
                action,
            },
        );
        if let Err(e) = self.bus.publish(event).await {
            warn!(chat_id, error = %e, "failed to publish action event");
            self.send(chat_id, "Something went wrong, please try again.").await;
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.messenger.send_message(chat_id, text).await {
            warn!(chat_id, error = %e, "failed to send message");
        }
    }

    async fn send_with_keyboard(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboard) {
        if let Err(e) = self.messenger.send_message_with_keyboard(chat_id, text, keyboard).await {
            warn!(chat_id, error = %e, "failed to send message with keyboard");
        }
    }
}

fn format_due(due: &DateTime<Utc>) -> String {
    due.format("%a %d %b %H:%M UTC").to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

struct ChatEvents(Arc<ChatService>);

#[async_trait]
impl EventHandler for ChatEvents {
    async fn handle(&self, event: Event) -> eyre::Result<()> {
        match &event.payload {
            EventPayload::TaskParsed {
                user_id,
                chat_id,
                description,
                due_at,
            } => {
                self.0.on_task_parsed(*user_id, *chat_id, description, *due_at).await;
            }
            EventPayload::TaskParseFailed { chat_id, reason, .. } => {
                self.0.on_parse_failed(*chat_id, reason).await;
            }
            EventPayload::TaskCreated { task } => {
                self.0.on_task_created(task).await;
            }
            EventPayload::TaskActionCompleted { chat_id, outcome, .. } => {
                self.0.on_action_completed(*chat_id, outcome).await;
            }
            EventPayload::ReminderDue { task } => {
                self.0.on_reminder(task, None).await;
            }
            EventPayload::ReminderNudge { task, overdue_secs } => {
                self.0.on_reminder(task, Some(*overdue_secs)).await;
            }
            other => {
                debug!(topic = %other.topic(), "chat service ignoring unexpected event");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "chat-service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use taskstore::MemoryStore;

    /// Messenger double recording every outbound message
    pub(crate) struct RecordingMessenger {
        sent: Mutex<Vec<(i64, String, Option<InlineKeyboard>)>>,
    }

    impl RecordingMessenger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, text, _)| text.clone()).collect()
        }

        fn last_keyboard(&self) -> Option<InlineKeyboard> {
            self.sent.lock().unwrap().iter().rev().find_map(|(_, _, kb)| kb.clone())
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, chat_id: i64, text: &str) -> eyre::Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string(), None));
            Ok(())
        }

        async fn send_message_with_keyboard(
            &self,
            chat_id: i64,
            text: &str,
            keyboard: &InlineKeyboard,
        ) -> eyre::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id, text.to_string(), Some(keyboard.clone())));
            Ok(())
        }
    }

    struct Fixture {
        bus: Arc<EventBus>,
        store: Arc<MemoryStore>,
        messenger: Arc<RecordingMessenger>,
        sessions: Arc<SessionManager>,
        service: Arc<ChatService>,
    }

    async fn fixture() -> Fixture {
        let bus = Arc::new(EventBus::synchronous());
        let store = Arc::new(MemoryStore::new());
        let messenger = RecordingMessenger::new();
        let sessions = Arc::new(SessionManager::new());
        let service = ChatService::new(
            Arc::clone(&bus),
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&messenger) as Arc<dyn Messenger>,
            Arc::clone(&sessions),
        )
        .await
        .unwrap();
        Fixture {
            bus,
            store,
            messenger,
            sessions,
            service,
        }
    }

    fn text_payload(text: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 7 },
                "chat": { "id": 42 },
                "text": text,
            }
        }))
        .unwrap()
    }

    fn callback_payload(data: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7 },
                "message": {
                    "message_id": 11,
                    "from": { "id": 999 },
                    "chat": { "id": 42 },
                },
                "data": data,
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_help_command() {
        let fx = fixture().await;
        fx.service.handle_webhook(&text_payload("/help")).await.unwrap();

        let texts = fx.messenger.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("/list"));
    }

    #[tokio::test]
    async fn test_add_without_args_awaits_task() {
        let fx = fixture().await;
        fx.service.handle_webhook(&text_payload("/add")).await.unwrap();

        assert_eq!(fx.sessions.state(7), ChatState::AwaitingTask);
        assert!(fx.messenger.texts()[0].contains("What should I remind you about"));
    }

    #[tokio::test]
    async fn test_unknown_command_answers_gracefully() {
        let fx = fixture().await;
        fx.service.handle_webhook(&text_payload("/frobnicate")).await.unwrap();
        assert!(fx.messenger.texts()[0].contains("Unknown command"));
    }

    #[tokio::test]
    async fn test_free_text_publishes_message_received() {
        let fx = fixture().await;

        struct Sink(Mutex<Vec<Event>>);
        #[async_trait]
        impl EventHandler for Sink {
            async fn handle(&self, event: Event) -> eyre::Result<()> {
                self.0.lock().unwrap().push(event);
                Ok(())
            }
            fn name(&self) -> &str {
                "sink"
            }
        }
        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        fx.bus.subscribe(Topic::MessageReceived, sink.clone()).unwrap();

        fx.service
            .handle_webhook(&text_payload("buy milk in 10 minutes"))
            .await
            .unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::MessageReceived { user_id, chat_id, text } => {
                assert_eq!(*user_id, 7);
                assert_eq!(*chat_id, 42);
                assert_eq!(text, "buy milk in 10 minutes");
            }
            other => panic!("expected MessageReceived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_task_parsed_event_asks_for_confirmation() {
        let fx = fixture().await;
        let due = Utc::now() + chrono::Duration::hours(1);

        fx.bus
            .publish(Event::new(
                "corr-1",
                EventPayload::TaskParsed {
                    user_id: 7,
                    chat_id: 42,
                    description: "buy milk".to_string(),
                    due_at: due,
                },
            ))
            .await
            .unwrap();

        assert!(matches!(fx.sessions.state(7), ChatState::ConfirmingTask { .. }));
        assert!(fx.messenger.texts()[0].contains("buy milk"));

        let keyboard = fx.messenger.last_keyboard().unwrap();
        let callbacks: Vec<&str> = keyboard.inline_keyboard[0]
            .iter()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert_eq!(callbacks, vec!["confirm", "discard"]);
    }

    #[tokio::test]
    async fn test_confirm_callback_requests_create() {
        let fx = fixture().await;

        struct Sink(Mutex<Vec<Event>>);
        #[async_trait]
        impl EventHandler for Sink {
            async fn handle(&self, event: Event) -> eyre::Result<()> {
                self.0.lock().unwrap().push(event);
                Ok(())
            }
            fn name(&self) -> &str {
                "sink"
            }
        }
        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        fx.bus.subscribe(Topic::TaskActionRequested, sink.clone()).unwrap();

        let due = Utc::now() + chrono::Duration::hours(1);
        fx.sessions.set_state(
            7,
            ChatState::ConfirmingTask {
                draft: TaskDraft {
                    description: "buy milk".to_string(),
                    due_at: due,
                },
            },
        );

        fx.service.handle_webhook(&callback_payload("confirm")).await.unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::TaskActionRequested {
                action: TaskAction::Create { description, due_at },
                ..
            } => {
                assert_eq!(description, "buy milk");
                assert_eq!(*due_at, due);
            }
            other => panic!("expected Create request, got {other:?}"),
        }
        // draft consumed, user back to Idle
        assert_eq!(fx.sessions.state(7), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_confirm_without_draft_answers_gracefully() {
        let fx = fixture().await;
        fx.service.handle_webhook(&callback_payload("confirm")).await.unwrap();
        assert!(fx.messenger.texts()[0].contains("Nothing pending"));
    }

    #[tokio::test]
    async fn test_degraded_callback_without_task_arg() {
        let fx = fixture().await;
        // bare "done" is what an over-cap payload degrades to
        fx.service.handle_webhook(&callback_payload("done")).await.unwrap();
        assert!(fx.messenger.texts()[0].contains("expired"));
    }

    #[tokio::test]
    async fn test_unknown_callback_action_answers_gracefully() {
        let fx = fixture().await;
        fx.service.handle_webhook(&callback_payload("warp|t=9")).await.unwrap();
        assert!(fx.messenger.texts()[0].contains("don't recognize"));
    }

    #[tokio::test]
    async fn test_list_command_builds_keyboard() {
        let fx = fixture().await;
        let task = Task::new(42, 7, "water plants", Utc::now() + chrono::Duration::hours(2));
        fx.store.create(&task).unwrap();

        fx.service.handle_webhook(&text_payload("/list")).await.unwrap();

        assert_eq!(fx.sessions.state(7), ChatState::ManagingTasks);
        assert!(fx.messenger.texts()[0].contains("water plants"));

        let keyboard = fx.messenger.last_keyboard().unwrap();
        let encoded = &keyboard.inline_keyboard[0][0].callback_data;
        let decoded = CallbackData::decode(encoded);
        assert_eq!(decoded.action, "done");
        assert_eq!(decoded.arg("t"), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let fx = fixture().await;
        fx.service.handle_webhook(&text_payload("/list")).await.unwrap();
        assert!(fx.messenger.texts()[0].contains("No open tasks"));
        assert_eq!(fx.sessions.state(7), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_reminder_delivery_flips_status() {
        let fx = fixture().await;
        let task = Task::new(42, 7, "stretch", Utc::now() - chrono::Duration::minutes(1));
        fx.store.create(&task).unwrap();

        fx.bus
            .publish(Event::fresh(EventPayload::ReminderDue { task: task.clone() }))
            .await
            .unwrap();

        assert!(fx.messenger.texts()[0].contains("Reminder: stretch"));
        assert_eq!(fx.store.get(&task.id).unwrap().unwrap().status, TaskStatus::Reminded);

        // the reminder keyboard round-trips through the codec
        let keyboard = fx.messenger.last_keyboard().unwrap();
        let snooze = CallbackData::decode(&keyboard.inline_keyboard[0][1].callback_data);
        assert_eq!(snooze.action, "snooze");
        assert_eq!(snooze.arg("m"), Some("15"));
    }

    #[tokio::test]
    async fn test_nudge_delivery_flips_status() {
        let fx = fixture().await;
        let mut task = Task::new(42, 7, "stretch", Utc::now() - chrono::Duration::minutes(5));
        task.set_status(TaskStatus::Reminded);
        fx.store.create(&task).unwrap();

        fx.bus
            .publish(Event::fresh(EventPayload::ReminderNudge {
                task: task.clone(),
                overdue_secs: 300,
            }))
            .await
            .unwrap();

        assert!(fx.messenger.texts()[0].contains("Still pending"));
        assert!(fx.messenger.texts()[0].contains("5 min"));
        assert_eq!(fx.store.get(&task.id).unwrap().unwrap().status, TaskStatus::Nudged);
    }

    #[tokio::test]
    async fn test_action_outcomes_become_messages() {
        let fx = fixture().await;

        for (outcome, needle) in [
            (
                ActionOutcome::Completed {
                    description: "x".to_string(),
                },
                "Done",
            ),
            (
                ActionOutcome::Deleted {
                    description: "x".to_string(),
                },
                "Deleted",
            ),
            (ActionOutcome::NotFound, "no longer exists"),
        ] {
            fx.bus
                .publish(Event::fresh(EventPayload::TaskActionCompleted {
                    chat_id: 42,
                    action: "complete".to_string(),
                    task_id: None,
                    outcome,
                }))
                .await
                .unwrap();
            assert!(fx.messenger.texts().last().unwrap().contains(needle));
        }
    }

    #[tokio::test]
    async fn test_malformed_webhook_payload_is_an_error() {
        let fx = fixture().await;
        // the listener still acks; this error is for the log only
        assert!(fx.service.handle_webhook(b"not json").await.is_err());
        assert!(fx.messenger.texts().is_empty());
    }

    #[test]
    fn test_truncate_respects_char_count() {
        assert_eq!(truncate("short", 24), "short");
        let long = "a very long description that overflows the button";
        let cut = truncate(long, 24);
        assert_eq!(cut.chars().count(), 24);
        assert!(cut.ends_with('…'));
    }
}

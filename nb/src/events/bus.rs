//! Event Bus - topic-keyed pub/sub core
//!
//! Services register handlers per [`Topic`] and publish [`Event`]s; the bus
//! fans each event out to the current subscribers of its topic. Subscriber
//! failures (errors and panics) are isolated per handler and logged - a
//! broken consumer can never fail or block the producer.
//!
//! Two dispatch modes:
//!
//! - [`DispatchMode::Sync`] - `publish` awaits every handler in
//!   registration order. Deterministic; what the tests use.
//! - [`DispatchMode::Async`] - handler invocations are queued to a bounded
//!   worker pool owned by the bus; `publish` returns once every invocation
//!   is queued. No ordering across events, bounded queue, no other
//!   backpressure contract.
//!
//! Handlers must not assume either mode.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::types::{Event, Topic};

/// Default worker count for async dispatch
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

/// Default async dispatch queue capacity (handler invocations)
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Errors from bus operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been closed; no new publishes or subscriptions
    #[error("event bus is closed")]
    Closed,
}

/// A registered consumer of one topic's events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event. Errors are logged by the bus, never propagated.
    async fn handle(&self, event: Event) -> eyre::Result<()>;

    /// Name used in dispatch logs
    fn name(&self) -> &str;
}

/// How `publish` runs subscriber invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Publish awaits every subscriber, in registration order
    Sync,
    /// Subscriber invocations are queued to the bus's worker pool
    Async,
}

/// Opaque handle identifying one registration, returned by `subscribe`
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: Topic,
    id: u64,
}

impl Subscription {
    /// The topic this subscription is registered on
    pub fn topic(&self) -> Topic {
        self.topic
    }

    #[cfg(test)]
    pub(crate) fn for_tests(topic: Topic, id: u64) -> Self {
        Self { topic, id }
    }
}

#[derive(Clone)]
struct Registered {
    id: u64,
    handler: Arc<dyn EventHandler>,
}

struct Job {
    handler: Arc<dyn EventHandler>,
    event: Event,
}

struct Registry {
    closed: bool,
    next_id: u64,
    subscribers: HashMap<Topic, Vec<Registered>>,
    /// Present in async mode while the bus is open; dropped on close so
    /// workers drain the queue and exit
    pool_tx: Option<mpsc::Sender<Job>>,
}

/// Topic-keyed publish/subscribe bus
///
/// The registry lives behind a read-write lock that is never held across an
/// await: dispatch clones the handler list out first, so health checks and
/// new subscriptions never wait on a slow handler.
pub struct EventBus {
    mode: DispatchMode,
    registry: RwLock<Registry>,
}

impl EventBus {
    /// Create a bus that dispatches synchronously
    pub fn synchronous() -> Self {
        debug!("EventBus: creating synchronous bus");
        Self {
            mode: DispatchMode::Sync,
            registry: RwLock::new(Registry {
                closed: false,
                next_id: 0,
                subscribers: HashMap::new(),
                pool_tx: None,
            }),
        }
    }

    /// Create a bus with an async dispatch pool
    ///
    /// Must be called from within a tokio runtime; the workers are spawned
    /// immediately and live until the bus is closed and the queue drains.
    pub fn asynchronous(workers: usize, queue_capacity: usize) -> Self {
        debug!(workers, queue_capacity, "EventBus: creating asynchronous bus");
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        spawn_dispatch_workers(workers.max(1), rx);
        Self {
            mode: DispatchMode::Async,
            registry: RwLock::new(Registry {
                closed: false,
                next_id: 0,
                subscribers: HashMap::new(),
                pool_tx: Some(tx),
            }),
        }
    }

    /// Async bus with default worker count and queue capacity
    pub fn with_default_dispatch() -> Self {
        Self::asynchronous(DEFAULT_DISPATCH_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }

    /// The bus's dispatch mode
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Register a handler for a topic
    ///
    /// Registrations accumulate; subscribing the same handler twice means it
    /// runs twice per event. Fails with [`BusError::Closed`] after `close`.
    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> Result<Subscription, BusError> {
        let mut registry = self.registry.write().expect("bus registry poisoned");
        if registry.closed {
            return Err(BusError::Closed);
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .subscribers
            .entry(topic)
            .or_default()
            .push(Registered { id, handler });

        debug!(%topic, subscription_id = id, "EventBus: subscribed");
        Ok(Subscription { topic, id })
    }

    /// Remove a registration; no-op if it was already removed
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut registry = self.registry.write().expect("bus registry poisoned");
        if let Some(handlers) = registry.subscribers.get_mut(&subscription.topic) {
            let before = handlers.len();
            handlers.retain(|r| r.id != subscription.id);
            if handlers.len() < before {
                debug!(topic = %subscription.topic, subscription_id = subscription.id, "EventBus: unsubscribed");
            }
        }
    }

    /// Dispatch an event to every current subscriber of its topic
    ///
    /// Subscriber errors and panics are logged, never returned; the only
    /// error a publisher can see is [`BusError::Closed`].
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        let topic = event.topic();
        let (targets, pool_tx) = {
            let registry = self.registry.read().expect("bus registry poisoned");
            if registry.closed {
                return Err(BusError::Closed);
            }
            (
                registry.subscribers.get(&topic).cloned().unwrap_or_default(),
                registry.pool_tx.clone(),
            )
        };

        debug!(%topic, subscribers = targets.len(), correlation_id = %event.correlation_id, "EventBus: publish");

        match self.mode {
            DispatchMode::Sync => {
                for registered in targets {
                    run_handler(&registered.handler, event.clone()).await;
                }
            }
            DispatchMode::Async => {
                let tx = pool_tx.ok_or(BusError::Closed)?;
                for registered in targets {
                    let job = Job {
                        handler: registered.handler,
                        event: event.clone(),
                    };
                    // Send fails only when close() raced us and dropped the
                    // pool; report Closed rather than silently dropping.
                    if tx.send(job).await.is_err() {
                        return Err(BusError::Closed);
                    }
                }
            }
        }

        Ok(())
    }

    /// Close the bus, idempotently
    ///
    /// In-flight dispatches (including queued async invocations) run to
    /// completion; new publishes and subscriptions fail with `Closed`.
    pub fn close(&self) {
        let mut registry = self.registry.write().expect("bus registry poisoned");
        if registry.closed {
            return;
        }
        registry.closed = true;
        registry.pool_tx = None;
        debug!("EventBus: closed");
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.registry.read().expect("bus registry poisoned").closed
    }

    /// Number of current subscribers on a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .read()
            .expect("bus registry poisoned")
            .subscribers
            .get(&topic)
            .map_or(0, |h| h.len())
    }
}

fn spawn_dispatch_workers(workers: usize, rx: mpsc::Receiver<Job>) {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    for worker in 0..workers {
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                match job {
                    Some(job) => run_handler(&job.handler, job.event).await,
                    None => break,
                }
            }
            debug!(worker, "dispatch worker exiting");
        });
    }
}

/// Run one handler invocation, containing errors and panics
async fn run_handler(handler: &Arc<dyn EventHandler>, event: Event) {
    let topic = event.topic();
    let correlation_id = event.correlation_id.clone();
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(handler = handler.name(), %topic, %correlation_id, error = %e, "subscriber failed")
        }
        Err(_) => {
            error!(handler = handler.name(), %topic, %correlation_id, "subscriber panicked")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventPayload;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn message(text: &str) -> Event {
        Event::new(
            "corr-test",
            EventPayload::MessageReceived {
                user_id: 1,
                chat_id: 2,
                text: text.to_string(),
            },
        )
    }

    fn parse_failed() -> Event {
        Event::new(
            "corr-test",
            EventPayload::TaskParseFailed {
                user_id: 1,
                chat_id: 2,
                text: "???".to_string(),
                reason: "unreadable".to_string(),
            },
        )
    }

    /// Records every event it sees
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn texts(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match &e.payload {
                    EventPayload::MessageReceived { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: Event) -> eyre::Result<()> {
            self.seen.lock().unwrap().push(event);
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    /// Counts invocations, failing or panicking on demand
    struct Faulty {
        hits: AtomicUsize,
        panic_once: AtomicBool,
        always_error: bool,
    }

    impl Faulty {
        fn erroring() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                panic_once: AtomicBool::new(false),
                always_error: true,
            })
        }

        fn panicking_once() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                panic_once: AtomicBool::new(true),
                always_error: false,
            })
        }
    }

    #[async_trait]
    impl EventHandler for Faulty {
        async fn handle(&self, _event: Event) -> eyre::Result<()> {
            if self.panic_once.swap(false, Ordering::SeqCst) {
                panic!("handler exploded");
            }
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.always_error {
                return Err(eyre::eyre!("handler failed"));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "faulty"
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn test_publish_reaches_only_matching_topic() {
        let bus = EventBus::synchronous();
        let on_message = Recorder::new();
        let on_parse_failed = Recorder::new();

        bus.subscribe(Topic::MessageReceived, on_message.clone()).unwrap();
        bus.subscribe(Topic::TaskParseFailed, on_parse_failed.clone()).unwrap();

        bus.publish(message("hello")).await.unwrap();
        assert_eq!(on_message.count(), 1);
        assert_eq!(on_parse_failed.count(), 0);

        bus.publish(parse_failed()).await.unwrap();
        assert_eq!(on_message.count(), 1);
        assert_eq!(on_parse_failed.count(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_is_ok() {
        let bus = EventBus::synchronous();
        assert!(bus.publish(message("into the void")).await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_invoked() {
        let bus = EventBus::synchronous();
        let a = Recorder::new();
        let b = Recorder::new();
        let c = Recorder::new();

        bus.subscribe(Topic::MessageReceived, a.clone()).unwrap();
        bus.subscribe(Topic::MessageReceived, b.clone()).unwrap();
        bus.subscribe(Topic::MessageReceived, c.clone()).unwrap();
        assert_eq!(bus.subscriber_count(Topic::MessageReceived), 3);

        bus.publish(message("fan out")).await.unwrap();

        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(c.count(), 1);
    }

    #[tokio::test]
    async fn test_sync_mode_preserves_publish_order() {
        let bus = EventBus::synchronous();
        let recorder = Recorder::new();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.publish(message("first")).await.unwrap();
        bus.publish(message("second")).await.unwrap();
        bus.publish(message("third")).await.unwrap();

        assert_eq!(recorder.texts(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_handler() {
        let bus = EventBus::synchronous();
        let recorder = Recorder::new();
        let sub = bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count(Topic::MessageReceived), 0);

        bus.publish(message("gone")).await.unwrap();
        assert_eq!(recorder.count(), 0);

        // double unsubscribe is a no-op, not an error
        bus.unsubscribe(&sub);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails_without_delivery() {
        let bus = EventBus::synchronous();
        let recorder = Recorder::new();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.close();
        assert!(bus.is_closed());

        let err = bus.publish(message("too late")).await.unwrap_err();
        assert_eq!(err, BusError::Closed);
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_fails() {
        let bus = EventBus::synchronous();
        bus.close();
        bus.close(); // idempotent

        let err = bus.subscribe(Topic::MessageReceived, Recorder::new()).unwrap_err();
        assert_eq!(err, BusError::Closed);
    }

    #[tokio::test]
    async fn test_erroring_subscriber_does_not_block_others() {
        let bus = EventBus::synchronous();
        let faulty = Faulty::erroring();
        let recorder = Recorder::new();

        bus.subscribe(Topic::MessageReceived, faulty.clone()).unwrap();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        // publisher sees Ok despite the failing handler
        bus.publish(message("resilient")).await.unwrap();

        assert_eq!(faulty.hits.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::synchronous();
        let panicky = Faulty::panicking_once();
        let recorder = Recorder::new();

        bus.subscribe(Topic::MessageReceived, panicky.clone()).unwrap();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.publish(message("boom")).await.unwrap();
        assert_eq!(recorder.count(), 1);

        // the panicking handler recovers on the next event
        bus.publish(message("calm")).await.unwrap();
        assert_eq!(panicky.hits.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.count(), 2);
    }

    #[tokio::test]
    async fn test_async_mode_delivers() {
        let bus = EventBus::asynchronous(2, 64);
        let recorder = Recorder::new();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.publish(message("async")).await.unwrap();

        let r = recorder.clone();
        wait_for(move || r.count() == 1).await;
    }

    #[tokio::test]
    async fn test_async_worker_survives_panic() {
        // single worker: a panicking job must not kill the pool
        let bus = EventBus::asynchronous(1, 64);
        let panicky = Faulty::panicking_once();
        bus.subscribe(Topic::MessageReceived, panicky.clone()).unwrap();

        bus.publish(message("first panics")).await.unwrap();
        bus.publish(message("second lands")).await.unwrap();

        let p = panicky.clone();
        wait_for(move || p.hits.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_async_queued_dispatch_drains_after_close() {
        let bus = EventBus::asynchronous(1, 64);
        let recorder = Recorder::new();
        bus.subscribe(Topic::MessageReceived, recorder.clone()).unwrap();

        bus.publish(message("in flight")).await.unwrap();
        bus.close();

        // the already-queued invocation still completes
        let r = recorder.clone();
        wait_for(move || r.count() == 1).await;

        assert_eq!(bus.publish(message("refused")).await.unwrap_err(), BusError::Closed);
    }
}

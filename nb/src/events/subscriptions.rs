//! Subscription lifecycle management
//!
//! Services do not call the bus directly at startup: a [`SubscriptionManager`]
//! establishes their fixed topic set with bounded retry/backoff, and keeps a
//! health map that a periodic operator check can read without touching the
//! bus. A service whose required topics cannot all be established must fail
//! its constructor - there is no partially wired mode.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::bus::{BusError, EventBus, EventHandler, Subscription};
use super::types::Topic;

/// Exponential backoff policy for subscription establishment
///
/// Attempt N (1-based retry count) waits `base * 2^(N-1)`, capped at `cap`.
/// With the defaults, attempts land at 0ms, 100ms, 200ms and 400ms.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound on any single delay
    pub cap: Duration,
    /// Retries after the initial attempt
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based retry
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base.saturating_mul(2u32.saturating_pow(exp)).min(self.cap)
    }

    /// Total attempts including the initial one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Where subscriptions are established
///
/// Implemented by [`EventBus`]; tests substitute flaky doubles to exercise
/// the retry path without a real bus failure.
pub trait SubscribeTarget: Send + Sync {
    /// Attempt one registration
    fn try_subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> Result<Subscription, BusError>;

    /// Remove a registration (used to roll back partial establishment)
    fn try_unsubscribe(&self, subscription: &Subscription);
}

impl SubscribeTarget for EventBus {
    fn try_subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> Result<Subscription, BusError> {
        self.subscribe(topic, handler)
    }

    fn try_unsubscribe(&self, subscription: &Subscription) {
        self.unsubscribe(subscription);
    }
}

/// Lifecycle of one manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// `establish` not called yet
    Uninitialized,
    /// `establish` in progress
    Subscribing,
    /// All required topics subscribed
    Healthy,
    /// Establishment exhausted retries for at least one topic
    Degraded,
}

/// Errors from subscription management
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Retries exhausted for one or more topics; fatal at service construction
    #[error("could not establish subscriptions for topics [{}]", list_topics(.topics))]
    EstablishFailed { topics: Vec<Topic> },

    /// Runtime health check found required topics unsubscribed
    #[error("subscription health degraded; missing topics [{}]", list_topics(.missing))]
    HealthDegraded { missing: Vec<Topic> },
}

fn list_topics(topics: &[Topic]) -> String {
    topics.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
}

struct Inner {
    state: ManagerState,
    required: Vec<Topic>,
    subscribed: HashMap<Topic, bool>,
}

/// Establishes and tracks a service's required subscriptions
///
/// The health map sits behind a read-write lock so `check_health` (called
/// from a periodic health routine) never contends with event delivery; it
/// is written only during establishment.
pub struct SubscriptionManager<B = EventBus> {
    target: Arc<B>,
    policy: BackoffPolicy,
    inner: RwLock<Inner>,
}

impl<B: SubscribeTarget> SubscriptionManager<B> {
    /// Create a manager with the default backoff policy
    pub fn new(target: Arc<B>) -> Self {
        Self::with_policy(target, BackoffPolicy::default())
    }

    /// Create a manager with an explicit backoff policy
    pub fn with_policy(target: Arc<B>, policy: BackoffPolicy) -> Self {
        Self {
            target,
            policy,
            inner: RwLock::new(Inner {
                state: ManagerState::Uninitialized,
                required: Vec::new(),
                subscribed: HashMap::new(),
            }),
        }
    }

    /// Establish every required subscription, retrying each per the policy
    ///
    /// On failure the error enumerates the topics that could not be
    /// subscribed, any registrations already made are rolled back, and the
    /// manager lands in [`ManagerState::Degraded`]. Callers treat that as
    /// fatal at startup.
    pub async fn establish(
        &self,
        handlers: Vec<(Topic, Arc<dyn EventHandler>)>,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let required: Vec<Topic> = handlers.iter().map(|(topic, _)| *topic).collect();
        {
            let mut inner = self.inner.write().expect("subscription state poisoned");
            inner.state = ManagerState::Subscribing;
            inner.subscribed = required.iter().map(|topic| (*topic, false)).collect();
            inner.required = required;
        }

        let mut established = Vec::new();
        let mut failed = Vec::new();

        for (topic, handler) in handlers {
            match self.subscribe_with_retry(topic, handler).await {
                Ok(subscription) => {
                    let mut inner = self.inner.write().expect("subscription state poisoned");
                    inner.subscribed.insert(topic, true);
                    established.push(subscription);
                }
                Err(e) => {
                    warn!(%topic, error = %e, attempts = self.policy.max_attempts(), "subscription exhausted retries");
                    failed.push(topic);
                }
            }
        }

        if failed.is_empty() {
            let mut inner = self.inner.write().expect("subscription state poisoned");
            inner.state = ManagerState::Healthy;
            info!(topics = established.len(), "subscriptions established");
            return Ok(established);
        }

        // Roll back the partial wiring so a failed service leaves no trace
        for subscription in &established {
            self.target.try_unsubscribe(subscription);
        }
        let mut inner = self.inner.write().expect("subscription state poisoned");
        for subscription in &established {
            inner.subscribed.insert(subscription.topic(), false);
        }
        inner.state = ManagerState::Degraded;
        Err(SubscriptionError::EstablishFailed { topics: failed })
    }

    async fn subscribe_with_retry(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> Result<Subscription, BusError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.target.try_subscribe(topic, Arc::clone(&handler)) {
                Ok(subscription) => {
                    debug!(%topic, attempt, "subscribed");
                    return Ok(subscription);
                }
                Err(e) => {
                    if attempt > self.policy.max_retries {
                        return Err(e);
                    }
                    let delay = self.policy.delay(attempt);
                    debug!(%topic, attempt, ?delay, "subscribe failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Verify every required topic is currently subscribed
    pub fn check_health(&self) -> Result<(), SubscriptionError> {
        let inner = self.inner.read().expect("subscription state poisoned");
        let missing: Vec<Topic> = inner
            .required
            .iter()
            .filter(|topic| !inner.subscribed.get(topic).copied().unwrap_or(false))
            .copied()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SubscriptionError::HealthDegraded { missing })
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ManagerState {
        self.inner.read().expect("subscription state poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::Event;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::Instant;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle(&self, _event: Event) -> eyre::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    /// Target that fails the first N attempts per topic, recording timings
    struct FlakyTarget {
        failures: Mutex<HashMap<Topic, u32>>,
        attempts: Mutex<Vec<(Topic, Instant)>>,
        removed: Mutex<Vec<Topic>>,
        next_id: AtomicU64,
    }

    impl FlakyTarget {
        fn new(failures: &[(Topic, u32)]) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures.iter().copied().collect()),
                attempts: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            })
        }

        fn attempts_for(&self, topic: Topic) -> Vec<Instant> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| *t == topic)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    impl SubscribeTarget for FlakyTarget {
        fn try_subscribe(&self, topic: Topic, _handler: Arc<dyn EventHandler>) -> Result<Subscription, BusError> {
            self.attempts.lock().unwrap().push((topic, Instant::now()));
            let mut failures = self.failures.lock().unwrap();
            let remaining = failures.entry(topic).or_insert(0);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BusError::Closed);
            }
            Ok(Subscription::for_tests(topic, self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn try_unsubscribe(&self, subscription: &Subscription) {
            self.removed.lock().unwrap().push(subscription.topic());
        }
    }

    #[test]
    fn test_backoff_policy_doubles_from_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_backoff_policy_caps() {
        let policy = BackoffPolicy {
            max_retries: 10,
            ..Default::default()
        };
        assert_eq!(policy.delay(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_establish_all_immediate() {
        let target = FlakyTarget::new(&[]);
        let manager = SubscriptionManager::new(target.clone());
        assert_eq!(manager.state(), ManagerState::Uninitialized);

        let subs = manager
            .establish(vec![
                (Topic::TaskParsed, Arc::new(Noop)),
                (Topic::TaskCreated, Arc::new(Noop)),
            ])
            .await
            .unwrap();

        assert_eq!(subs.len(), 2);
        assert_eq!(manager.state(), ManagerState::Healthy);
        assert!(manager.check_health().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_retries_with_increasing_delays() {
        // TaskCreated fails twice, succeeds on the third attempt
        let target = FlakyTarget::new(&[(Topic::TaskCreated, 2)]);
        let manager = SubscriptionManager::new(target.clone());

        manager
            .establish(vec![
                (Topic::TaskParsed, Arc::new(Noop)),
                (Topic::TaskCreated, Arc::new(Noop)),
            ])
            .await
            .unwrap();

        assert!(manager.check_health().is_ok());
        assert_eq!(manager.state(), ManagerState::Healthy);

        // paused clock makes the backoff exact: 100ms then 200ms
        let attempts = target.attempts_for(Topic::TaskCreated);
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_millis(100));
        assert_eq!(attempts[2] - attempts[1], Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_exhausts_retries_and_reports_topic() {
        // TaskCreated never succeeds within the attempt budget
        let target = FlakyTarget::new(&[(Topic::TaskCreated, 100)]);
        let manager = SubscriptionManager::new(target.clone());

        let err = manager
            .establish(vec![
                (Topic::TaskParsed, Arc::new(Noop)),
                (Topic::TaskCreated, Arc::new(Noop)),
            ])
            .await
            .unwrap_err();

        match &err {
            SubscriptionError::EstablishFailed { topics } => {
                assert_eq!(topics, &vec![Topic::TaskCreated]);
            }
            other => panic!("expected EstablishFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("task.created"));

        // initial attempt + 3 retries
        assert_eq!(target.attempts_for(Topic::TaskCreated).len(), 4);

        // the topic that did subscribe was rolled back
        assert_eq!(*target.removed.lock().unwrap(), vec![Topic::TaskParsed]);
        assert_eq!(manager.state(), ManagerState::Degraded);

        let health = manager.check_health().unwrap_err();
        match health {
            SubscriptionError::HealthDegraded { missing } => {
                assert!(missing.contains(&Topic::TaskCreated));
                assert!(missing.contains(&Topic::TaskParsed));
            }
            other => panic!("expected HealthDegraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_health_before_establish_is_ok() {
        let target = FlakyTarget::new(&[]);
        let manager = SubscriptionManager::new(target);
        // nothing required yet, nothing can be missing
        assert!(manager.check_health().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_against_closed_bus_fails() {
        let bus = Arc::new(EventBus::synchronous());
        bus.close();
        let manager = SubscriptionManager::new(bus);

        let err = manager
            .establish(vec![(Topic::MessageReceived, Arc::new(Noop))])
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::EstablishFailed { .. }));
        assert_eq!(manager.state(), ManagerState::Degraded);
    }

    #[tokio::test]
    async fn test_establish_against_real_bus() {
        let bus = Arc::new(EventBus::synchronous());
        let manager = SubscriptionManager::new(Arc::clone(&bus));

        manager
            .establish(vec![
                (Topic::ReminderDue, Arc::new(Noop)),
                (Topic::ReminderNudge, Arc::new(Noop)),
            ])
            .await
            .unwrap();

        assert_eq!(bus.subscriber_count(Topic::ReminderDue), 1);
        assert_eq!(bus.subscriber_count(Topic::ReminderNudge), 1);
        assert!(manager.check_health().is_ok());
    }
}

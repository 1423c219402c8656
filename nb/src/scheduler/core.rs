//! Reminder scheduler implementation
//!
//! A polling loop that scans the task store for due work and publishes
//! reminder/nudge events. The scheduler is stateless between polls: the
//! store's status field is the only deduplication, so `find_due` must stop
//! returning a task once it has been acted on. If a status update fails
//! after an event already went out, the next tick can emit a duplicate -
//! a known limitation, inherited from the store-as-truth design.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use taskstore::{Task, TaskStatus, TaskStore};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::{Event, EventBus, EventPayload};

use super::config::SchedulerConfig;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Errors from scheduler control and poll cycles
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` called while the poll loop is live
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// The drain did not finish within the shutdown budget
    #[error("scheduler drain timed out after {timeout_ms}ms")]
    StopTimeout { timeout_ms: u64 },

    /// The store was unreachable for one cycle; retried next tick
    #[error("due-task query failed: {0}")]
    QueryFailed(#[from] taskstore::StoreError),
}

/// What one poll cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Due tasks returned by the store
    pub scanned: usize,
    /// Initial reminders published
    pub reminders: usize,
    /// Escalations published
    pub nudges: usize,
}

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls the task store and publishes `reminder.due` / `reminder.nudge`
pub struct ReminderScheduler {
    config: SchedulerConfig,
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    state: Mutex<RunState>,
    running: tokio::sync::Mutex<Option<RunningLoop>>,
}

impl ReminderScheduler {
    /// Create a scheduler; call `start` to begin polling
    pub fn new(config: SchedulerConfig, store: Arc<dyn TaskStore>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            store,
            bus,
            state: Mutex::new(RunState::Stopped),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state.lock().expect("scheduler state poisoned")
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().expect("scheduler state poisoned") = state;
    }

    /// Start the poll loop
    ///
    /// Rejected with [`SchedulerError::AlreadyRunning`] if already started.
    /// A no-op when the scheduler is disabled by configuration.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.config.enabled {
            info!("reminder scheduler disabled by configuration");
            return Ok(());
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.set_state(RunState::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            shutdown_rx,
        ));
        *running = Some(RunningLoop { shutdown_tx, handle });
        self.set_state(RunState::Running);

        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            worker_count = self.config.worker_count,
            "reminder scheduler started"
        );
        Ok(())
    }

    /// Signal shutdown and wait (bounded) for the loop and its cycle
    /// workers to drain
    ///
    /// The shutdown signal is observed between cycles, never mid-task. On
    /// timeout the loop is aborted and [`SchedulerError::StopTimeout`] is
    /// returned, but the scheduler still lands in `Stopped`.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        let Some(RunningLoop { shutdown_tx, handle }) = running.take() else {
            debug!("stop: scheduler not running");
            return Ok(());
        };

        self.set_state(RunState::Stopping);
        let _ = shutdown_tx.send(true);

        let timeout = self.config.shutdown_timeout();
        let drained = tokio::time::timeout(timeout, handle).await;
        self.set_state(RunState::Stopped);

        match drained {
            Ok(_) => {
                info!("reminder scheduler stopped");
                Ok(())
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "scheduler drain timed out");
                Err(SchedulerError::StopTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Run a single poll cycle (useful for testing)
    pub async fn poll_once(&self) -> Result<CycleStats, SchedulerError> {
        run_cycle(&self.config, &self.store, &self.bus).await
    }
}

async fn poll_loop(
    config: SchedulerConfig,
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("poll loop: shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match run_cycle(&config, &store, &bus).await {
                    Ok(stats) if stats.scanned > 0 => debug!(?stats, "poll cycle complete"),
                    Ok(_) => {}
                    // store errors abort only this cycle; next tick retries
                    Err(e) => warn!(error = %e, "poll cycle failed"),
                }
            }
        }
    }
}

async fn run_cycle(
    config: &SchedulerConfig,
    store: &Arc<dyn TaskStore>,
    bus: &Arc<EventBus>,
) -> Result<CycleStats, SchedulerError> {
    let now = Utc::now();
    let due = store.find_due(now)?;
    let mut stats = CycleStats {
        scanned: due.len(),
        ..Default::default()
    };
    if due.is_empty() {
        return Ok(stats);
    }

    debug!(due = due.len(), "poll cycle: dispatching to workers");

    // Partition the due set across the worker pool; every worker is joined
    // before the cycle returns, so ticks never overlap.
    let workers = config.worker_count.max(1);
    let chunk_size = due.len().div_ceil(workers);
    let nudge_delay = config.nudge_delay();

    let mut handles = Vec::new();
    for chunk in due.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let bus = Arc::clone(bus);
        handles.push(tokio::spawn(async move {
            let mut published = (0usize, 0usize);
            for task in chunk {
                match notify_task(&bus, task, now, nudge_delay).await {
                    Some(Notification::Reminder) => published.0 += 1,
                    Some(Notification::Nudge) => published.1 += 1,
                    None => {}
                }
            }
            published
        }));
    }

    for handle in handles {
        if let Ok((reminders, nudges)) = handle.await {
            stats.reminders += reminders;
            stats.nudges += nudges;
        }
    }

    Ok(stats)
}

enum Notification {
    Reminder,
    Nudge,
}

async fn notify_task(
    bus: &Arc<EventBus>,
    task: Task,
    now: DateTime<Utc>,
    nudge_delay: chrono::Duration,
) -> Option<Notification> {
    let overdue = now - task.due_at;
    let task_id = task.id.clone();

    let (payload, kind) = match task.status {
        // never reminded: initial reminder, regardless of how overdue
        TaskStatus::Active => (EventPayload::ReminderDue { task }, Notification::Reminder),
        // already reminded: escalate once the nudge delay has passed
        TaskStatus::Reminded if overdue >= nudge_delay => (
            EventPayload::ReminderNudge {
                overdue_secs: overdue.num_seconds(),
                task,
            },
            Notification::Nudge,
        ),
        _ => return None,
    };

    match bus.publish(Event::fresh(payload)).await {
        Ok(()) => Some(kind),
        Err(e) => {
            // publish failures never abort the cycle
            warn!(%task_id, error = %e, "failed to publish reminder event");
            None
        }
    }
}

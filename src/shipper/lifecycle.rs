use crate::shipper::publisher::{BatchPublisher, PublishOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Scheduled,
    Publishing,
    ShuttingDown,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub initial_delay: Duration,
    pub period: Duration,
    /// How long shutdown waits for an in-flight run before cancelling it.
    pub shutdown_timeout: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5),
            period: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a completed shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The in-flight run did not finish within the timeout and was cancelled.
    pub forced: bool,
    /// Outcomes of the final drain, in order. Always at least one entry.
    pub final_outcomes: Vec<PublishOutcome>,
}

impl ShutdownReport {
    pub fn delivered_events(&self) -> usize {
        self.final_outcomes
            .iter()
            .map(|o| match o {
                PublishOutcome::Delivered { events, .. } => *events,
                _ => 0,
            })
            .sum()
    }

    pub fn lost_events(&self) -> usize {
        self.final_outcomes
            .iter()
            .map(|o| match o {
                PublishOutcome::Lost { events, .. } => *events,
                _ => 0,
            })
            .sum()
    }
}

/// Drives the publisher on a fixed period and owns the shutdown sequence.
///
/// Scheduled runs and the final drain all go through the same publisher lock,
/// so two runs can never touch the sequence token at the same time.
pub struct LifecycleController {
    publisher: Arc<Mutex<BatchPublisher>>,
    state: Arc<watch::Sender<LifecycleState>>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    scheduled_runs: Arc<AtomicU64>,
    shutdown_timeout: Duration,
}

impl LifecycleController {
    /// Arms the periodic schedule. Must be called from within a tokio runtime.
    pub fn start(publisher: BatchPublisher, schedule: ScheduleConfig) -> Self {
        let publisher = Arc::new(Mutex::new(publisher));
        let (state, _) = watch::channel(LifecycleState::Idle);
        let state = Arc::new(state);
        let cancel = CancellationToken::new();
        let scheduled_runs = Arc::new(AtomicU64::new(0));

        // A zero period would make the interval panic
        let period = schedule.period.max(Duration::from_millis(1));

        // Set before spawning so the first run always sees Scheduled
        state.send_replace(LifecycleState::Scheduled);
        let task = tokio::spawn(run_schedule(
            Arc::clone(&publisher),
            Arc::clone(&state),
            cancel.clone(),
            Arc::clone(&scheduled_runs),
            schedule.initial_delay,
            period,
        ));

        info!(
            period_ms = period.as_millis() as u64,
            initial_delay_ms = schedule.initial_delay.as_millis() as u64,
            "Log publisher scheduled"
        );

        Self {
            publisher,
            state,
            cancel,
            task: std::sync::Mutex::new(Some(task)),
            scheduled_runs,
            shutdown_timeout: schedule.shutdown_timeout,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Number of publisher runs started by the schedule (the final drain excluded).
    pub fn scheduled_runs(&self) -> u64 {
        self.scheduled_runs.load(Ordering::Relaxed)
    }

    /// Current sequence token. Waits for an in-flight run to finish.
    pub async fn sequence_token(&self) -> Option<String> {
        self.publisher.lock().await.sequence_token().map(str::to_string)
    }

    /// Stops the schedule, waits for the in-flight run and flushes what is left.
    ///
    /// The final drain keeps publishing until every event buffered when it
    /// started has been handed to a batch. Returns `None` if shutdown already ran.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let mut task = task?;

        self.state.send_replace(LifecycleState::ShuttingDown);
        info!("Shutting down log publisher and awaiting termination");
        self.cancel.cancel();

        let forced = match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                error!(error = %e, "Log publisher task ended abnormally");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Log publisher did not finish in time, cancelling the in-flight batch"
                );
                task.abort();
                if let Err(e) = task.await {
                    debug!(error = %e, "Cancelled log publisher task");
                }
                true
            }
        };

        self.state.send_replace(LifecycleState::Draining);
        info!("Sending remaining log events after shutdown");

        let final_outcomes = {
            let mut publisher = self.publisher.lock().await;
            drain_remaining(&mut publisher).await
        };

        self.state.send_replace(LifecycleState::Stopped);
        info!(
            batches = final_outcomes.len(),
            forced = forced,
            "Log publisher stopped"
        );

        Some(ShutdownReport {
            forced,
            final_outcomes,
        })
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_schedule(
    publisher: Arc<Mutex<BatchPublisher>>,
    state: Arc<watch::Sender<LifecycleState>>,
    cancel: CancellationToken,
    scheduled_runs: Arc<AtomicU64>,
    initial_delay: Duration,
    period: Duration,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let mut guard = publisher.lock().await;
        scheduled_runs.fetch_add(1, Ordering::Relaxed);
        transition(&state, LifecycleState::Scheduled, LifecycleState::Publishing);

        let outcome = guard.publish().await;
        drop(guard);

        transition(&state, LifecycleState::Publishing, LifecycleState::Scheduled);
        if outcome != PublishOutcome::Empty {
            debug!(outcome = ?outcome, "Scheduled publish finished");
        }
    }

    debug!("Log publisher schedule stopped");
}

/// Moves `from` to `to`, leaving any other state (e.g. a shutdown in progress) untouched.
fn transition(state: &watch::Sender<LifecycleState>, from: LifecycleState, to: LifecycleState) {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    });
}

async fn drain_remaining(publisher: &mut BatchPublisher) -> Vec<PublishOutcome> {
    let pending = publisher.buffered();
    let mut handled = 0usize;
    let mut outcomes = Vec::new();

    loop {
        let outcome = publisher.publish().await;
        let events = match &outcome {
            PublishOutcome::Empty => 0,
            PublishOutcome::Delivered { events, .. } | PublishOutcome::Lost { events, .. } => {
                *events
            }
        };
        outcomes.push(outcome);
        handled += events;

        if events == 0 || handled >= pending {
            break;
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryAdapter, DestinationIdentity, Result as DeliveryResult};
    use crate::shipper::event_buffer::{EventBuffer, LogEvent};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct Recording {
        batches: StdMutex<Vec<Vec<LogEvent>>>,
        delay: Duration,
    }

    impl Recording {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                batches: StdMutex::new(Vec::new()),
                delay,
            })
        }

        fn batches(&self) -> Vec<Vec<LogEvent>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryAdapter for Recording {
        async fn put_batch(
            &self,
            _destination: &DestinationIdentity,
            events: &[LogEvent],
            _sequence_token: Option<&str>,
        ) -> DeliveryResult<Option<String>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.batches.lock().unwrap().push(events.to_vec());
            Ok(Some(format!("token-{}", events.len())))
        }
    }

    fn publisher(
        adapter: Arc<Recording>,
        batch_size: usize,
    ) -> (Arc<EventBuffer>, BatchPublisher) {
        let buffer = Arc::new(EventBuffer::unbounded());
        let publisher = BatchPublisher::new(
            Arc::clone(&buffer),
            adapter,
            DestinationIdentity::new("g", "s"),
            None,
            batch_size,
        );
        (buffer, publisher)
    }

    fn idle_schedule() -> ScheduleConfig {
        ScheduleConfig {
            initial_delay: Duration::from_secs(3600),
            period: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_shutdown_flushes_without_any_scheduled_run() {
        let adapter = Recording::new(Duration::ZERO);
        let (buffer, publisher) = publisher(Arc::clone(&adapter), 100);
        let controller = LifecycleController::start(publisher, idle_schedule());
        assert_eq!(controller.state(), LifecycleState::Scheduled);

        for i in 0..3 {
            buffer.try_enqueue(LogEvent::new(format!("m{}", i), i));
        }

        let report = controller.shutdown().await.unwrap();

        assert_eq!(controller.scheduled_runs(), 0);
        assert_eq!(adapter.batches().len(), 1);
        assert_eq!(adapter.batches()[0].len(), 3);
        assert_eq!(report.delivered_events(), 3);
        assert!(!report.forced);
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert_eq!(controller.sequence_token().await.as_deref(), Some("token-3"));
    }

    #[tokio::test]
    async fn test_shutdown_on_empty_buffer_still_runs_once() {
        let adapter = Recording::new(Duration::ZERO);
        let (_buffer, publisher) = publisher(Arc::clone(&adapter), 100);
        let controller = LifecycleController::start(publisher, idle_schedule());

        let report = controller.shutdown().await.unwrap();

        assert_eq!(report.final_outcomes, vec![PublishOutcome::Empty]);
        assert!(adapter.batches().is_empty());
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let adapter = Recording::new(Duration::ZERO);
        let (_buffer, publisher) = publisher(adapter, 100);
        let controller = LifecycleController::start(publisher, idle_schedule());

        assert!(controller.shutdown().await.is_some());
        assert!(controller.shutdown().await.is_none());
    }

    #[tokio::test]
    async fn test_final_drain_covers_multiple_batches() {
        let adapter = Recording::new(Duration::ZERO);
        let (buffer, publisher) = publisher(Arc::clone(&adapter), 2);
        let controller = LifecycleController::start(publisher, idle_schedule());

        for i in 0..5 {
            buffer.try_enqueue(LogEvent::new("x", i));
        }

        let report = controller.shutdown().await.unwrap();

        let sizes: Vec<usize> = adapter.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(report.delivered_events(), 5);
        assert!(buffer.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_first_run_reports_publishing() {
        let adapter = Recording::new(Duration::from_millis(300));
        let (buffer, publisher) = publisher(Arc::clone(&adapter), 100);
        buffer.try_enqueue(LogEvent::new("first", 1));

        let controller = LifecycleController::start(
            publisher,
            ScheduleConfig {
                initial_delay: Duration::ZERO,
                period: Duration::from_secs(3600),
                shutdown_timeout: Duration::from_secs(5),
            },
        );

        let mut states = controller.subscribe();
        let entered = tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == LifecycleState::Publishing),
        )
        .await
        .map(|seen| seen.is_ok())
        .unwrap_or(false);
        assert!(entered, "first run never entered Publishing");
        drop(states);

        controller.shutdown().await;
        assert_eq!(adapter.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_publishes_periodically() {
        let adapter = Recording::new(Duration::ZERO);
        let (buffer, publisher) = publisher(Arc::clone(&adapter), 100);
        let controller = LifecycleController::start(
            publisher,
            ScheduleConfig {
                initial_delay: Duration::from_millis(5),
                period: Duration::from_millis(20),
                shutdown_timeout: Duration::from_secs(5),
            },
        );

        buffer.try_enqueue(LogEvent::new("early", 1));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(controller.scheduled_runs() >= 2);
        assert_eq!(adapter.batches().len(), 1);
        assert!(buffer.is_empty());

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_run_is_cancelled_after_timeout() {
        let adapter = Recording::new(Duration::from_secs(30));
        let (buffer, publisher) = publisher(Arc::clone(&adapter), 1);
        let controller = LifecycleController::start(
            publisher,
            ScheduleConfig {
                initial_delay: Duration::from_millis(1),
                period: Duration::from_secs(3600),
                shutdown_timeout: Duration::from_millis(50),
            },
        );

        buffer.try_enqueue(LogEvent::new("stuck", 1));
        // Let the first run pick up the event and block in the adapter
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(controller.state(), LifecycleState::Publishing);

        let report = controller.shutdown().await.unwrap();

        assert!(report.forced);
        assert_eq!(report.final_outcomes, vec![PublishOutcome::Empty]);
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }
}

//! Periodic update loop with failure backoff.
//!
//! The [`Scheduler`] fires once per interval. After a run of failed attempts
//! it leaves a growing number of ticks idle before trying again: the k-th
//! consecutive failure is followed by k-1 idle ticks, so attempts land on
//! ticks 1, 2, 4, 7, 11, ... The idle window is capped so that an attempt
//! still happens at least once every 24 hours.
//!
//! ## Lifecycle
//!
//! 1. Create with [`Scheduler::new()`]
//! 2. Start [`spawn_signal_listener()`] (or keep the sender for a service
//!    controller) and hand the receiver to [`Scheduler::run()`]
//! 3. The loop runs until a shutdown message arrives, finishing any
//!    in-flight attempt first

use crate::config::DEFAULT_INTERVAL;
use crate::error::{DynipError, Result};
use crate::protocol::{UpdateClient, UpdateResult};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Upper bound on how long backoff may stay silent.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// One update attempt, as seen by the scheduler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Updater: Send + Sync {
    /// Perform one update.
    async fn update(&self) -> Result<UpdateResult>;
}

#[async_trait]
impl Updater for UpdateClient {
    async fn update(&self) -> Result<UpdateResult> {
        self.update_ip().await
    }
}

/// Run one update on its own task so a panic cannot take the caller down.
///
/// A panicking attempt is reported as [`DynipError::Panic`], which maps to
/// `LOCAL_ERROR`.
pub async fn attempt(updater: Arc<dyn Updater>) -> Result<UpdateResult> {
    match tokio::spawn(async move { updater.update().await }).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!("Panic during update: {}", message);
            Err(DynipError::Panic(message))
        }
        Err(e) => Err(DynipError::Panic(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// What the scheduler does on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Perform an update attempt.
    Attempt,
    /// Stay idle; `remaining` further ticks will be skipped after this one.
    Skip { remaining: u32 },
}

/// Backoff counters, owned and mutated only by the tick handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    skip: u32,
    skip_count: u32,
    max_skips: u32,
}

impl SchedulerState {
    /// Counters for the given tick interval.
    pub fn new(interval: Duration) -> Self {
        let max_skips = (MAX_BACKOFF.as_secs() / interval.as_secs().max(1)) as u32;
        Self {
            skip: 0,
            skip_count: 0,
            max_skips,
        }
    }

    /// Current backoff level.
    pub fn skip(&self) -> u32 {
        self.skip
    }

    /// Ticks elapsed in the current backoff window.
    pub fn skip_count(&self) -> u32 {
        self.skip_count
    }

    /// Ceiling for [`skip`](Self::skip).
    pub fn max_skips(&self) -> u32 {
        self.max_skips
    }

    /// Advance by one tick.
    pub fn on_tick(&mut self) -> TickAction {
        self.skip_count += 1;
        if self.skip_count >= self.skip {
            self.skip_count = 0;
            TickAction::Attempt
        } else {
            TickAction::Skip {
                remaining: self.skip - self.skip_count - 1,
            }
        }
    }

    /// Record the outcome of an attempt.
    pub fn record(&mut self, success: bool) {
        if success {
            self.skip = 0;
        } else if self.skip < self.max_skips {
            self.skip += 1;
        }
    }
}

/// Interval to tick at. Anything at or below one second falls back to the default.
pub fn effective_interval(interval: Duration) -> Duration {
    if interval <= Duration::from_secs(1) {
        warn!(
            "invalid interval ({:?}); defaulting to {:?}",
            interval, DEFAULT_INTERVAL
        );
        DEFAULT_INTERVAL
    } else {
        interval
    }
}

/// Long-running update loop.
pub struct Scheduler {
    updater: Arc<dyn Updater>,
    hostname: String,
    interval: Duration,
    state: SchedulerState,
}

impl Scheduler {
    /// Create a scheduler ticking at `interval`.
    pub fn new(updater: Arc<dyn Updater>, hostname: impl Into<String>, interval: Duration) -> Self {
        let interval = effective_interval(interval);
        Self {
            updater,
            hostname: hostname.into(),
            interval,
            state: SchedulerState::new(interval),
        }
    }

    /// Interval actually in use.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Backoff counters.
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Run until a shutdown message arrives on `shutdown`.
    ///
    /// The first tick fires one interval after start. Shutdown is observed
    /// between ticks; an attempt already in flight completes first. A dropped
    /// sender counts as a shutdown.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<String>) -> Result<()> {
        info!(
            interval = ?self.interval,
            hostname = %self.hostname,
            max_skips = self.state.max_skips(),
            "Dynip daemon starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                reason = &mut shutdown => {
                    let reason = reason.unwrap_or_else(|_| "shutdown channel closed".to_string());
                    info!(reason = %reason, "Dynip daemon exiting");
                    return Ok(());
                }

                _ = ticker.tick() => self.on_tick().await,
            }
        }
    }

    async fn on_tick(&mut self) {
        match self.state.on_tick() {
            TickAction::Attempt => {
                info!(hostname = %self.hostname, "Dynip updating IP");
                match attempt(Arc::clone(&self.updater)).await {
                    Ok(result) => {
                        info!(hostname = %self.hostname, %result, "Update succeeded");
                        self.state.record(true);
                    }
                    Err(e) => {
                        self.state.record(false);
                        warn!(
                            hostname = %self.hostname,
                            result = %e.update_result(),
                            skip = self.state.skip(),
                            "Update failed: {}",
                            e
                        );
                    }
                }
            }
            TickAction::Skip { remaining } => {
                info!(
                    hostname = %self.hostname,
                    remaining,
                    "Skipping update after repeated failures"
                );
            }
        }
        debug!(state = ?self.state, "Tick handled");
    }
}

/// Listen for SIGINT/SIGTERM and forward the first one as a shutdown message.
pub fn spawn_signal_listener(tx: oneshot::Sender<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                let _ = tx.send(signal.to_string());
            }
            Err(e) => {
                error!("Failed to install signal handlers: {}", e);
                let _ = tx.send(format!("signal setup failed: {}", e));
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const TICK: Duration = Duration::from_secs(60);

    /// Attempt numbers (1-based ticks) over `ticks` ticks when every attempt fails.
    fn failing_attempt_ticks(state: &mut SchedulerState, ticks: u32) -> Vec<u32> {
        (1..=ticks)
            .filter(|_| match state.on_tick() {
                TickAction::Attempt => {
                    state.record(false);
                    true
                }
                TickAction::Skip { .. } => false,
            })
            .collect()
    }

    #[test]
    fn test_max_skips() {
        assert_eq!(SchedulerState::new(Duration::from_secs(11 * 60)).max_skips(), 130);
        assert_eq!(SchedulerState::new(Duration::from_secs(8 * 3600)).max_skips(), 3);
        assert_eq!(SchedulerState::new(Duration::from_secs(48 * 3600)).max_skips(), 0);
    }

    #[test]
    fn test_triangular_backoff() {
        let mut state = SchedulerState::new(TICK);
        let attempts = failing_attempt_ticks(&mut state, 22);
        assert_eq!(attempts, [1, 2, 4, 7, 11, 16, 22]);
        assert_eq!(state.skip(), 7);
    }

    #[test]
    fn test_skip_reports_remaining() {
        let mut state = SchedulerState::new(TICK);
        assert_eq!(failing_attempt_ticks(&mut state, 4), [1, 2, 4]);
        // failures on ticks 1, 2 and 4 leave skip at 3
        assert_eq!(state.skip(), 3);
        assert_eq!(state.on_tick(), TickAction::Skip { remaining: 1 });
        assert_eq!(state.on_tick(), TickAction::Skip { remaining: 0 });
        assert_eq!(state.on_tick(), TickAction::Attempt);
    }

    #[test]
    fn test_backoff_capped_at_max_skips() {
        let mut state = SchedulerState::new(Duration::from_secs(8 * 3600));
        let attempts = failing_attempt_ticks(&mut state, 16);
        assert_eq!(attempts, [1, 2, 4, 7, 10, 13, 16]);
        assert_eq!(state.skip(), state.max_skips());
    }

    #[test]
    fn test_long_interval_never_skips() {
        let mut state = SchedulerState::new(Duration::from_secs(48 * 3600));
        let attempts = failing_attempt_ticks(&mut state, 5);
        assert_eq!(attempts, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut state = SchedulerState::new(TICK);
        failing_attempt_ticks(&mut state, 7);
        assert_eq!(state.skip(), 4);

        state.record(true);
        assert_eq!(state.skip(), 0);
        for _ in 0..5 {
            assert_eq!(state.on_tick(), TickAction::Attempt);
            state.record(true);
        }
    }

    #[test]
    fn test_effective_interval() {
        assert_eq!(effective_interval(Duration::ZERO), DEFAULT_INTERVAL);
        assert_eq!(effective_interval(Duration::from_secs(1)), DEFAULT_INTERVAL);
        assert_eq!(effective_interval(Duration::from_secs(2)), Duration::from_secs(2));
    }

    struct CountingUpdater {
        calls: Arc<AtomicU32>,
        result: UpdateResult,
    }

    #[async_trait]
    impl Updater for CountingUpdater {
        async fn update(&self) -> Result<UpdateResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.result.is_success() {
                Ok(self.result)
            } else {
                Err(DynipError::Provider(self.result))
            }
        }
    }

    struct SlowUpdater {
        started: Arc<AtomicU32>,
        finished: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Updater for SlowUpdater {
        async fn update(&self) -> Result<UpdateResult> {
            self.started.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_secs(30)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(UpdateResult::Success)
        }
    }

    #[tokio::test]
    async fn test_attempt_converts_panic() {
        let mut mock = MockUpdater::new();
        mock.expect_update().times(1).returning(|| panic!("nil dereference"));

        let err = assert_err!(attempt(Arc::new(mock)).await);
        assert!(matches!(&err, DynipError::Panic(msg) if msg == "nil dereference"));
        assert_eq!(err.update_result(), UpdateResult::LocalError);
    }

    #[tokio::test]
    async fn test_attempt_passes_result_through() {
        let mut mock = MockUpdater::new();
        mock.expect_update()
            .times(1)
            .returning(|| Ok(UpdateResult::NoChange));

        let result = assert_ok!(attempt(Arc::new(mock)).await);
        assert_eq!(result, UpdateResult::NoChange);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_on_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let updater = CountingUpdater {
            calls: Arc::clone(&calls),
            result: UpdateResult::TooSoon,
        };
        let scheduler = Scheduler::new(Arc::new(updater), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));

        // ticks 1..=7 fire; attempts on 1, 2, 4 and 7
        time::sleep(TICK * 7 + TICK / 2).await;
        tx.send("test".to_string()).unwrap();
        assert_ok!(handle.await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attempts_every_tick_on_success() {
        let mut mock = MockUpdater::new();
        mock.expect_update()
            .times(3)
            .returning(|| Ok(UpdateResult::Success));

        let scheduler = Scheduler::new(Arc::new(mock), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));

        time::sleep(TICK * 3 + TICK / 2).await;
        tx.send("test".to_string()).unwrap();
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_panicking_attempt() {
        let mut mock = MockUpdater::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| panic!("boom"));
        mock.expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(UpdateResult::Success));

        let scheduler = Scheduler::new(Arc::new(mock), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));

        // tick 1 panics, tick 2 is still attempted (first failure leaves no idle tick)
        time::sleep(TICK * 2 + TICK / 2).await;
        tx.send("test".to_string()).unwrap();
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_tick() {
        let calls = Arc::new(AtomicU32::new(0));
        let updater = CountingUpdater {
            calls: Arc::clone(&calls),
            result: UpdateResult::Success,
        };
        let scheduler = Scheduler::new(Arc::new(updater), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        tx.send("SIGTERM".to_string()).unwrap();

        assert_ok!(scheduler.run(rx).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_loop() {
        let mock = MockUpdater::new();
        let scheduler = Scheduler::new(Arc::new(mock), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel::<String>();
        drop(tx);

        assert_ok!(scheduler.run(rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempts_after_shutdown() {
        let calls = Arc::new(AtomicU32::new(0));
        let updater = CountingUpdater {
            calls: Arc::clone(&calls),
            result: UpdateResult::NoChange,
        };
        let scheduler = Scheduler::new(Arc::new(updater), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));

        time::sleep(TICK * 2 + TICK / 2).await;
        tx.send("SIGINT".to_string()).unwrap();
        assert_ok!(handle.await.unwrap());
        let seen = calls.load(Ordering::SeqCst);
        assert_eq!(seen, 2);

        time::sleep(TICK * 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_attempt_in_flight() {
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let updater = SlowUpdater {
            started: Arc::clone(&started),
            finished: Arc::clone(&finished),
        };
        let scheduler = Scheduler::new(Arc::new(updater), "test.example.com", TICK);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));

        // first tick at 60s, its attempt runs until 90s
        time::sleep(Duration::from_secs(70)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        tx.send("SIGTERM".to_string()).unwrap();
        assert_ok!(handle.await.unwrap());

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}

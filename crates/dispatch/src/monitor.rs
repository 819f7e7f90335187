//! Periodic health monitor.
//!
//! The monitor owns a single restartable background task that emits a
//! [`ProbeSignal`] ("check the agent version now") on a fixed schedule: once
//! after [`INITIAL_DELAY`], then every [`PERIOD`]. It never talks to the
//! agent itself; the receiving end of its channel (see
//! [`crate::watcher::VersionWatcher`]) does.
//!
//! ## Start / stop
//!
//! - [`HealthMonitor::start`] spawns a fresh schedule beginning again at the
//!   initial delay. Starting a running monitor is a no-op.
//! - [`HealthMonitor::stop`] cancels pending and future ticks and waits for
//!   the task to exit, so no signal is emitted after it returns. Stopping a
//!   stopped monitor is a no-op.
//! - Dropping the monitor cancels and aborts the task.
//!
//! Signals go through a channel of capacity one. A tick that finds the
//! previous signal still unconsumed is dropped rather than queued.
//!
//! Every signal carries the epoch of the schedule that emitted it. `start`
//! and `stop` both advance the epoch, so a signal still sitting in the
//! channel after a stop is recognisably stale (see
//! [`HealthMonitor::is_current`]) and must not trigger a probe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Timestamp;

/// Delay before the first probe of a schedule.
pub const INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Delay between consecutive probes.
pub const PERIOD: Duration = Duration::from_secs(60);

/// Service the probe asks about.
pub const AGENT_SERVICE_NAME: &str = "Agent";

// ---------------------------------------------------------------------------

/// Timing of a probe schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSchedule {
    initial_delay: Duration,
    period: Duration,
}

impl ProbeSchedule {
    /// Creates a schedule. Returns `None` for a zero period.
    pub fn new(initial_delay: Duration, period: Duration) -> Option<Self> {
        if period.is_zero() {
            None
        } else {
            Some(Self {
                initial_delay,
                period,
            })
        }
    }

    /// Delay before the first tick.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Delay between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            period: PERIOD,
        }
    }
}

/// Request to probe the upstream version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSignal {
    /// Service to probe.
    pub service: &'static str,
    /// 1-based tick number within the current schedule.
    pub tick: u64,
    /// Epoch of the schedule that emitted the signal.
    pub epoch: u64,
    /// When the tick fired.
    pub issued_at: Timestamp,
}

// ---------------------------------------------------------------------------

struct RunningSchedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningSchedule {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Owner of the restartable probe task.
pub struct HealthMonitor {
    schedule: ProbeSchedule,
    signals: mpsc::Sender<ProbeSignal>,
    running: Mutex<Option<RunningSchedule>>,
    epoch: AtomicU64,
}

impl HealthMonitor {
    /// Creates a stopped monitor and the receiver its signals are delivered to.
    pub fn new(schedule: ProbeSchedule) -> (Self, mpsc::Receiver<ProbeSignal>) {
        let (signals, receiver) = mpsc::channel(1);
        let monitor = Self {
            schedule,
            signals,
            running: Mutex::new(None),
            epoch: AtomicU64::new(0),
        };
        (monitor, receiver)
    }

    /// The schedule every start begins with.
    pub fn schedule(&self) -> ProbeSchedule {
        self.schedule
    }

    /// Returns `true` while a schedule is active.
    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(RunningSchedule::is_live)
    }

    /// Returns `true` if `signal` was emitted by the schedule running now.
    ///
    /// Signals issued before the latest `start` or `stop` are stale.
    pub fn is_current(&self, signal: &ProbeSignal) -> bool {
        signal.epoch == self.epoch.load(Ordering::Acquire)
    }

    /// Starts a fresh schedule. Returns `false` if one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(RunningSchedule::is_live) {
            return false;
        }

        // The first deadline is fixed here, not when the task is first polled.
        let first_tick = Instant::now() + self.schedule.initial_delay;
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            first_tick,
            self.schedule.period,
            epoch,
            self.signals.clone(),
            cancel.clone(),
        ));
        *slot = Some(RunningSchedule { cancel, handle });

        info!(
            initial_delay_ms = self.schedule.initial_delay.as_millis() as u64,
            period_ms = self.schedule.period.as_millis() as u64,
            "Health monitor started"
        );
        true
    }

    /// Stops the schedule and waits for its task to exit.
    ///
    /// Returns `false` if the monitor was not running.
    pub async fn stop(&self) -> bool {
        let running = self.slot().take();
        let Some(running) = running else {
            return false;
        };
        self.epoch.fetch_add(1, Ordering::AcqRel);
        running.cancel.cancel();
        if let Err(err) = running.handle.await {
            if err.is_panic() {
                warn!(error = %err, "Health monitor task panicked");
            }
        }
        info!("Health monitor stopped");
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<RunningSchedule>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("schedule", &self.schedule)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_schedule(
    first_tick: Instant,
    period: Duration,
    epoch: u64,
    signals: mpsc::Sender<ProbeSignal>,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(first_tick, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        tick += 1;
        let signal = ProbeSignal {
            service: AGENT_SERVICE_NAME,
            tick,
            epoch,
            issued_at: Timestamp::now(),
        };
        match signals.try_send(signal) {
            Ok(()) => debug!(tick, "Probe signal emitted"),
            Err(TrySendError::Full(_)) => {
                debug!(tick, "Previous probe still pending, tick coalesced");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(tick, "Probe receiver dropped, health monitor exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::advance;

    use super::*;

    fn schedule() -> ProbeSchedule {
        ProbeSchedule::new(Duration::from_secs(5), Duration::from_secs(60)).unwrap()
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ProbeSignal>) -> Vec<u64> {
        let mut ticks = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            ticks.push(signal.tick);
        }
        ticks
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(ProbeSchedule::new(Duration::from_secs(1), Duration::ZERO).is_none());
        assert_eq!(ProbeSchedule::default().initial_delay(), INITIAL_DELAY);
        assert_eq!(ProbeSchedule::default().period(), PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_initial_delay_then_every_period() {
        let (monitor, mut rx) = HealthMonitor::new(schedule());
        assert!(monitor.start());
        settle().await;

        advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![1]);

        advance(Duration::from_secs(59)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_while_running() {
        let (monitor, _rx) = HealthMonitor::new(schedule());
        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_future_ticks_and_restart_begins_at_initial_delay() {
        let (monitor, mut rx) = HealthMonitor::new(schedule());
        monitor.start();
        settle().await;
        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![1]);

        assert!(monitor.stop().await);
        assert!(!monitor.is_running());
        assert!(!monitor.stop().await);

        advance(Duration::from_secs(600)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());

        assert!(monitor.start());
        settle().await;
        advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());
        advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_queued_before_stop_are_stale() {
        let (monitor, mut rx) = HealthMonitor::new(schedule());
        monitor.start();
        settle().await;
        advance(Duration::from_secs(5)).await;
        settle().await;

        let queued = rx.try_recv().unwrap();
        assert!(monitor.is_current(&queued));

        monitor.stop().await;
        assert!(!monitor.is_current(&queued));

        monitor.start();
        settle().await;
        advance(Duration::from_secs(5)).await;
        settle().await;
        let fresh = rx.try_recv().unwrap();
        assert!(monitor.is_current(&fresh));
        assert!(!monitor.is_current(&queued));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signal_coalesces_later_ticks() {
        let (monitor, mut rx) = HealthMonitor::new(schedule());
        monitor.start();
        settle().await;
        advance(Duration::from_secs(5)).await;
        settle().await;
        advance(Duration::from_secs(60)).await;
        settle().await;

        assert_eq!(drain(&mut rx), vec![1]);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_monitor_releases_the_task() {
        let (monitor, mut rx) = HealthMonitor::new(schedule());
        monitor.start();
        settle().await;
        drop(monitor);
        settle().await;

        advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}

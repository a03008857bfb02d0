// SPDX-License-Identifier: MPL-2.0

//! # Polling Scheduler
//!
//! Each poll job fires once immediately, then on a fixed interval, and
//! turns every response into an [`Action`] for the [`Store`].
//!
//! ## Ticks
//!
//! ```text
//! ┌──────────────┐  tick   ┌─────────────┐ in flight? ┌──────────┐
//! │ Ticker       │────────►│ job loop    │───yes─────►│ skipped  │
//! │ (runtime or  │         │             │            └──────────┘
//! │  own thread) │         └──────┬──────┘
//! └──────────────┘                │ no: next_seq(), spawn request
//!                                 ▼
//!                          ┌─────────────┐ Loaded / Failed ┌───────┐
//!                          │ request     │────────────────►│ Store │
//!                          └─────────────┘                 └───────┘
//! ```
//!
//! A job never has two requests outstanding. Ticks landing while a
//! request is in flight are counted and dropped. There is no jitter and
//! no backoff; a failed request is reported and the next tick tries again.
//!
//! ## Dedicated timer thread
//!
//! [`TimerMode::DedicatedThread`] drives the ticks from a plain OS thread
//! so a busy runtime cannot starve the timer. If the thread cannot be
//! spawned the job falls back to the runtime interval.
//!
//! ## Teardown
//!
//! Every job holds a child of the scheduler's [`CancellationToken`].
//! Stopping a job, stopping the scheduler or dropping it cancels the loop
//! and any request still outstanding.

use crate::error::Result;
use crate::state::{Action, Payload, Slice, Store};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    #[default]
    Runtime,
    DedicatedThread,
}

/// What to poll and how often.
#[derive(Debug, Clone)]
pub struct PollJob {
    pub name: String,
    pub slice: Slice,
    pub interval: Duration,
    pub timer: TimerMode,
}

impl PollJob {
    pub fn new(name: impl Into<String>, slice: Slice, interval: Duration) -> Self {
        Self {
            name: name.into(),
            slice,
            interval,
            timer: TimerMode::Runtime,
        }
    }

    pub fn with_timer(mut self, timer: TimerMode) -> Self {
        self.timer = timer;
        self
    }
}

/// Per-job request accounting.
#[derive(Debug, Default)]
pub struct PollCounters {
    issued: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl PollCounters {
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Ticks dropped because the previous request was still in flight.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle to a running poll job.
pub struct PollHandle {
    name: String,
    slice: Slice,
    cancel: CancellationToken,
    counters: Arc<PollCounters>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slice(&self) -> Slice {
        self.slice
    }

    pub fn counters(&self) -> &PollCounters {
        &self.counters
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Owns a set of poll jobs; usually one scheduler per view.
pub struct Scheduler {
    root: CancellationToken,
    jobs: Vec<PollHandle>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            jobs: Vec::new(),
        }
    }

    /// Start polling `fetch` for `job`, feeding results into `store`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn spawn_poll<F, Fut>(&mut self, store: &Store, job: PollJob, fetch: F) -> &PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        let cancel = self.root.child_token();
        let counters = Arc::new(PollCounters::default());
        log::info!(
            "Starting poll job {} every {:?} ({:?} timer)",
            job.name,
            job.interval,
            job.timer
        );

        let ticker = Ticker::new(&job, cancel.clone());
        let task = tokio::spawn(run_job(
            job.clone(),
            ticker,
            store.clone(),
            fetch,
            cancel.clone(),
            Arc::clone(&counters),
        ));

        let index = self.jobs.len();
        self.jobs.push(PollHandle {
            name: job.name,
            slice: job.slice,
            cancel,
            counters,
            task,
        });
        &self.jobs[index]
    }

    pub fn jobs(&self) -> &[PollHandle] {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&PollHandle> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Cancel every job owned by this scheduler.
    pub fn stop(&self) {
        if !self.root.is_cancelled() {
            log::info!("Stopping {} poll job(s)", self.jobs.len());
        }
        self.root.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Stop all jobs and wait for their loops to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        let tasks: Vec<_> = self.jobs.drain(..).map(|j| j.task).collect();
        futures_util::future::join_all(tasks).await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

// ============================================================================
// Job loop
// ============================================================================

async fn run_job<F, Fut>(
    job: PollJob,
    mut ticker: Ticker,
    store: Store,
    fetch: F,
    cancel: CancellationToken,
    counters: Arc<PollCounters>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload>> + Send + 'static,
{
    let in_flight = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            alive = ticker.tick() => {
                if !alive {
                    log::warn!("Timer for {} stopped", job.name);
                    break;
                }
            }
        }

        if in_flight.swap(true, Ordering::AcqRel) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            log::debug!("{}: previous request still in flight, skipping tick", job.name);
            continue;
        }

        let seq = store.next_seq();
        counters.issued.fetch_add(1, Ordering::Relaxed);

        let request = fetch();
        let store = store.clone();
        let cancel = cancel.clone();
        let counters = Arc::clone(&counters);
        let in_flight = Arc::clone(&in_flight);
        let name = job.name.clone();
        let slice = job.slice;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = request => match result {
                    Ok(payload) => {
                        store.dispatch(Action::Loaded { payload, seq, at: Utc::now() });
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::warn!("{name} poll #{seq} failed: {e}");
                        store.dispatch(Action::Failed { slice, error: e.to_string(), seq });
                    }
                },
            }
            in_flight.store(false, Ordering::Release);
        });
    }

    log::debug!("Poll job {} exited", job.name);
}

// ============================================================================
// Tick sources
// ============================================================================

/// How often a dedicated timer thread checks for cancellation while sleeping.
const THREAD_CANCEL_POLL: Duration = Duration::from_millis(50);

enum Ticker {
    Runtime(Interval),
    Thread(mpsc::Receiver<()>),
}

impl Ticker {
    fn new(job: &PollJob, cancel: CancellationToken) -> Self {
        match job.timer {
            TimerMode::Runtime => Self::runtime(job.interval),
            TimerMode::DedicatedThread => match Self::spawn_thread(job, cancel) {
                Ok(rx) => Ticker::Thread(rx),
                Err(e) => {
                    log::warn!(
                        "Could not start timer thread for {} ({e}), using runtime timer",
                        job.name
                    );
                    Self::runtime(job.interval)
                }
            },
        }
    }

    fn runtime(period: Duration) -> Self {
        // First tick completes immediately.
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticker::Runtime(interval)
    }

    fn spawn_thread(job: &PollJob, cancel: CancellationToken) -> std::io::Result<mpsc::Receiver<()>> {
        let (tx, rx) = mpsc::channel(1);
        let period = job.interval;
        std::thread::Builder::new()
            .name(format!("poll-timer-{}", job.name))
            .spawn(move || {
                while !cancel.is_cancelled() {
                    // A full channel means the job has not consumed the last
                    // tick yet; drop this one.
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                        break;
                    }
                    // Sleep in slices so a stopped job releases its thread promptly.
                    let deadline = Instant::now() + period;
                    while !cancel.is_cancelled() {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            break;
                        }
                        std::thread::sleep(left.min(THREAD_CANCEL_POLL));
                    }
                }
                log::debug!("Timer thread exiting");
            })?;
        Ok(rx)
    }

    /// Wait for the next tick. `false` if the tick source has gone away.
    async fn tick(&mut self) -> bool {
        match self {
            Ticker::Runtime(interval) => {
                interval.tick().await;
                true
            }
            Ticker::Thread(rx) => rx.recv().await.is_some(),
        }
    }
}

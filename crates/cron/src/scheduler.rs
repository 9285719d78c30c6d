//! Tick-driven scheduler.
//!
//! Each tick checks every enabled job against the clock, delivers a
//! [`CronPayload`] for each due one and records the firing in the store.
//! Missed ticks are skipped, so a job overdue by many periods fires once on
//! the next tick rather than replaying the backlog.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    naia_gateway::EventSink,
    naia_protocol::{CronPayload, ShellMessage},
    serde::Serialize,
    tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    clock::{Clock, SystemClock},
    error::{CronError, Result},
    schedule,
    store::CronStore,
    types::{CronJob, truncate_ms},
};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub job_count: usize,
    pub enabled_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_wake: Option<DateTime<Utc>>,
}

pub struct CronScheduler {
    store: Arc<Mutex<CronStore>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    period: Duration,
    running: AtomicBool,
}

impl CronScheduler {
    pub fn new(store: Arc<Mutex<CronStore>>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            sink,
            clock: Arc::new(SystemClock),
            period: DEFAULT_TICK,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tick(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn store(&self) -> &Arc<Mutex<CronStore>> {
        &self.store
    }

    /// Fire every job due now. Returns the payloads that were fired.
    pub async fn tick(&self) -> Vec<CronPayload> {
        let mut store = self.store.lock().await;
        store.reload();
        let now = truncate_ms(self.clock.now());
        let due: Vec<CronJob> = store
            .jobs()
            .iter()
            .filter(|job| schedule::is_due(job, now))
            .cloned()
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for job in due {
            fired.push(self.fire(&mut store, &job, now));
        }
        fired
    }

    /// Fire a job immediately, ignoring its schedule and enabled flag.
    pub async fn run_now(&self, id: &str) -> Result<CronPayload> {
        let mut store = self.store.lock().await;
        store.reload();
        let job = store
            .get(id)
            .cloned()
            .ok_or_else(|| CronError::NotFound(id.to_string()))?;
        let now = truncate_ms(self.clock.now());
        Ok(self.fire(&mut store, &job, now))
    }

    /// Deliver, then record. Neither a delivery failure nor a store write
    /// failure stops the caller; both are logged.
    fn fire(&self, store: &mut CronStore, job: &CronJob, now: DateTime<Utc>) -> CronPayload {
        let payload = CronPayload {
            job_id: job.id.clone(),
            label: job.label.clone(),
            task: job.task.clone(),
            fired_at: now,
        };
        debug!(job_id = %job.id, label = %job.label, "cron job fired");

        if let Err(e) = self.sink.deliver(ShellMessage::CronFire(payload.clone())) {
            warn!(job_id = %job.id, error = %e, "failed to deliver cron payload");
        }
        if let Err(e) = store.mark_fired_at(&job.id, now) {
            warn!(job_id = %job.id, error = %e, "failed to record cron firing");
        }
        payload
    }

    pub async fn status(&self) -> SchedulerStatus {
        let mut store = self.store.lock().await;
        store.reload();
        let now = self.clock.now();
        SchedulerStatus {
            running: self.is_running(),
            job_count: store.len(),
            enabled_count: store.jobs().iter().filter(|j| j.enabled).count(),
            next_wake: store
                .jobs()
                .iter()
                .filter_map(|j| schedule::next_fire(j, now))
                .min(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the tick loop. It runs until [`SchedulerHandle::stop`].
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let token = cancel.clone();
        self.running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(tick_ms = scheduler.period.as_millis() as u64, "cron scheduler started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let fired = scheduler.tick().await;
                        if !fired.is_empty() {
                            debug!(count = fired.len(), "cron tick fired jobs");
                        }
                    },
                }
            }

            scheduler.running.store(false, Ordering::SeqCst);
            info!("cron scheduler stopped");
        });

        SchedulerHandle { cancel, task }
    }
}

/// Stops the tick loop between ticks.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "cron scheduler task failed");
        }
    }
}

//! Cron engine: durable job store plus a tick-driven scheduler.
//!
//! The store is the only writer of job definitions. The scheduler reads it
//! every tick, delivers a [`CronPayload`](naia_protocol::CronPayload) through
//! the shell sink for each due job and records the firing.

pub mod clock;
pub mod error;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

pub use {
    clock::{Clock, ManualClock, SystemClock},
    error::{CronError, Result},
    scheduler::{CronScheduler, SchedulerHandle, SchedulerStatus},
    store::CronStore,
    types::{AddJobOptions, CronJob, CronSchedule, JobPatch},
};

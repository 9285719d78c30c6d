use std::path::Path;

use {
    anyhow::{Context, Result, bail},
    chrono::{DateTime, Utc},
    clap::Subcommand,
    naia_cron::{AddJobOptions, CronSchedule, CronStore, JobPatch},
    tracing::info,
};

#[derive(Subcommand)]
pub enum CronAction {
    /// List all jobs in the local store.
    List,
    /// Add a job. Exactly one of `--at`, `--every-ms` or `--cron` is required.
    Add {
        #[arg(long)]
        label: String,
        #[arg(long)]
        task: String,
        /// Fire once at this RFC 3339 instant.
        #[arg(long, conflicts_with_all = ["every_ms", "cron"])]
        at: Option<String>,
        /// Fire every N milliseconds.
        #[arg(long, conflicts_with = "cron")]
        every_ms: Option<u64>,
        /// Fire on a 5-field cron expression.
        #[arg(long)]
        cron: Option<String>,
        /// IANA time zone for `--cron` (host local time when omitted).
        #[arg(long, requires = "cron")]
        tz: Option<String>,
        /// Explicit job id (generated when omitted).
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove a job.
    Remove { id: String },
    /// Enable a job.
    Enable { id: String },
    /// Disable a job without removing it.
    Disable { id: String },
}

pub fn handle_cron(action: CronAction, store_path: &Path) -> Result<()> {
    let mut store = CronStore::open(store_path);
    let output = apply(action, &mut store)?;
    println!("{output}");
    Ok(())
}

fn apply(action: CronAction, store: &mut CronStore) -> Result<String> {
    match action {
        CronAction::List => Ok(serde_json::to_string_pretty(store.jobs())?),
        CronAction::Add {
            label,
            task,
            at,
            every_ms,
            cron,
            tz,
            id,
        } => {
            let schedule = schedule_from_args(at, every_ms, cron, tz)?;
            let mut options = AddJobOptions::new(label, task, schedule);
            if let Some(id) = id {
                options = options.with_id(id);
            }
            let job = store.add(options)?;
            info!(job_id = %job.id, kind = job.schedule.kind(), "cron job added");
            Ok(serde_json::to_string_pretty(&job)?)
        },
        CronAction::Remove { id } => {
            if !store.remove(&id)? {
                bail!("no cron job with id {id}");
            }
            info!(job_id = %id, "cron job removed");
            Ok(format!("removed {id}"))
        },
        CronAction::Enable { id } => set_enabled(store, &id, true),
        CronAction::Disable { id } => set_enabled(store, &id, false),
    }
}

fn set_enabled(store: &mut CronStore, id: &str, enabled: bool) -> Result<String> {
    let Some(job) = store.update(id, JobPatch::enabled(enabled))? else {
        bail!("no cron job with id {id}");
    };
    info!(job_id = %job.id, enabled, "cron job updated");
    Ok(serde_json::to_string_pretty(&job)?)
}

fn schedule_from_args(
    at: Option<String>,
    every_ms: Option<u64>,
    cron: Option<String>,
    tz: Option<String>,
) -> Result<CronSchedule> {
    match (at, every_ms, cron) {
        (Some(at), None, None) => {
            let date = DateTime::parse_from_rfc3339(&at)
                .with_context(|| format!("invalid --at instant {at:?}"))?;
            Ok(CronSchedule::at(date.with_timezone(&Utc)))
        },
        (None, Some(interval_ms), None) => Ok(CronSchedule::every_ms(interval_ms)),
        (None, None, Some(expression)) => Ok(CronSchedule::Cron { expression, tz }),
        (None, None, None) => bail!("one of --at, --every-ms or --cron is required"),
        _ => bail!("--at, --every-ms and --cron are mutually exclusive"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(label: &str, every_ms: u64, id: Option<&str>) -> CronAction {
        CronAction::Add {
            label: label.into(),
            task: format!("{label} task"),
            at: None,
            every_ms: Some(every_ms),
            cron: None,
            tz: None,
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn picks_exactly_one_schedule() {
        assert_eq!(
            schedule_from_args(None, Some(500), None, None).unwrap(),
            CronSchedule::every_ms(500)
        );
        assert_eq!(
            schedule_from_args(None, None, Some("0 9 * * 1-5".into()), Some("UTC".into())).unwrap(),
            CronSchedule::Cron {
                expression: "0 9 * * 1-5".into(),
                tz: Some("UTC".into()),
            }
        );
        let at = schedule_from_args(Some("2026-03-01T10:00:00+01:00".into()), None, None, None)
            .unwrap();
        assert_eq!(at.kind(), "at");

        assert!(schedule_from_args(None, None, None, None).is_err());
        assert!(schedule_from_args(Some("yesterday".into()), None, None, None).is_err());
        assert!(schedule_from_args(None, Some(1), Some("* * * * *".into()), None).is_err());
    }

    #[test]
    fn manages_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let mut store = CronStore::open(&path);

        apply(add("backup", 60_000, Some("backup")), &mut store).unwrap();
        apply(add("digest", 3_600_000, None), &mut store).unwrap();
        assert!(apply(add("again", 1000, Some("backup")), &mut store).is_err());

        let listed: serde_json::Value =
            serde_json::from_str(&apply(CronAction::List, &mut store).unwrap()).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);

        apply(CronAction::Disable { id: "backup".into() }, &mut store).unwrap();
        let reopened = CronStore::open(&path);
        assert!(!reopened.get("backup").unwrap().enabled);

        apply(CronAction::Enable { id: "backup".into() }, &mut store).unwrap();
        assert!(store.get("backup").unwrap().enabled);

        apply(CronAction::Remove { id: "backup".into() }, &mut store).unwrap();
        assert!(apply(CronAction::Remove { id: "backup".into() }, &mut store).is_err());
        assert!(apply(CronAction::Enable { id: "backup".into() }, &mut store).is_err());
        assert_eq!(CronStore::open(&path).len(), 1);
    }

    #[test]
    fn rejects_invalid_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CronStore::open(dir.path().join("jobs.json"));
        assert!(apply(add("never", 0, None), &mut store).is_err());
        assert!(store.is_empty());
    }
}

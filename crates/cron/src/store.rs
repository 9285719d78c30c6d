//! Durable job store: one JSON file holding the full job list.
//!
//! Every mutation re-reads the file, builds the next list from what is on
//! disk, writes it and only then swaps it in. Other processes sharing the
//! file (`naia cron` next to a running agent) therefore see each other's
//! changes instead of overwriting them.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    chrono::{DateTime, Utc},
    tracing::{debug, warn},
};

use crate::{
    clock::{Clock, SystemClock},
    error::{CronError, Result},
    schedule,
    types::{AddJobOptions, CronJob, JobPatch, truncate_ms},
};

pub struct CronStore {
    path: PathBuf,
    jobs: Vec<CronJob>,
    clock: Arc<dyn Clock>,
}

impl CronStore {
    /// Open the store at `path`. A missing, unreadable or corrupt file is
    /// treated as an empty job list.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let mut store = Self {
            path: path.into(),
            jobs: Vec::new(),
            clock,
        };
        store.reload();
        debug!(path = %store.path.display(), jobs = store.jobs.len(), "cron store loaded");
        store
    }

    /// Re-read the file. A missing file means no jobs; an unreadable one is
    /// logged and the current list kept.
    pub fn reload(&mut self) {
        match read_jobs(&self.path) {
            Ok(jobs) => self.jobs = jobs,
            Err(CronError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.jobs.clear();
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable cron store");
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Vec<CronJob> {
        self.jobs.clone()
    }

    pub fn jobs(&self) -> &[CronJob] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&CronJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Add an enabled job. Fails with [`CronError::DuplicateId`] when the id
    /// is taken, leaving the store untouched.
    pub fn add(&mut self, options: AddJobOptions) -> Result<CronJob> {
        schedule::validate(&options.schedule)?;
        self.reload();
        let id = options
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if self.get(&id).is_some() {
            return Err(CronError::DuplicateId(id));
        }

        let job = CronJob {
            id,
            label: options.label,
            task: options.task,
            schedule: options.schedule,
            enabled: true,
            created_at: truncate_ms(self.clock.now()),
            last_fired_at: None,
        };
        let mut next = self.jobs.clone();
        next.push(job.clone());
        self.commit(next)?;
        debug!(id = %job.id, kind = job.schedule.kind(), "cron job added");
        Ok(job)
    }

    /// Returns false when no job has this id.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        self.reload();
        let mut next = self.jobs.clone();
        let before = next.len();
        next.retain(|j| j.id != id);
        if next.len() == before {
            return Ok(false);
        }
        self.commit(next)?;
        debug!(id, "cron job removed");
        Ok(true)
    }

    /// Apply the fields present in `patch`. `None` when the id is unknown.
    pub fn update(&mut self, id: &str, patch: JobPatch) -> Result<Option<CronJob>> {
        if let Some(schedule) = &patch.schedule {
            schedule::validate(schedule)?;
        }
        self.reload();
        let mut next = self.jobs.clone();
        let Some(job) = next.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };

        if let Some(label) = patch.label {
            job.label = label;
        }
        if let Some(task) = patch.task {
            job.task = task;
        }
        if let Some(schedule) = patch.schedule {
            job.schedule = schedule;
        }
        if let Some(enabled) = patch.enabled {
            job.enabled = enabled;
        }
        let updated = job.clone();
        self.commit(next)?;
        Ok(Some(updated))
    }

    /// Record a firing now. No-op for an unknown id.
    pub fn mark_fired(&mut self, id: &str) -> Result<Option<CronJob>> {
        let now = self.clock.now();
        self.mark_fired_at(id, now)
    }

    /// Record a firing at `at`. A one-shot job is disabled in the same write.
    pub fn mark_fired_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<Option<CronJob>> {
        self.reload();
        let mut next = self.jobs.clone();
        let Some(job) = next.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };
        job.last_fired_at = Some(truncate_ms(at));
        if job.schedule.is_one_shot() {
            job.enabled = false;
        }
        let fired = job.clone();
        self.commit(next)?;
        Ok(Some(fired))
    }

    fn commit(&mut self, next: Vec<CronJob>) -> Result<()> {
        write_jobs(&self.path, &next)?;
        self.jobs = next;
        Ok(())
    }
}

fn read_jobs(path: &Path) -> Result<Vec<CronJob>> {
    let data = fs::read_to_string(path)?;
    let jobs: Vec<CronJob> = serde_json::from_str(&data)?;
    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.id.as_str()) {
            return Err(CronError::Validation(format!("duplicate job id {}", job.id)));
        }
    }
    Ok(jobs)
}

/// Write to a sibling temp file, then rename over the target.
fn write_jobs(path: &Path, jobs: &[CronJob]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(jobs)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", std::process::id()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub type Result<T, E = CronError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Persisted data that parses but breaks a store invariant.
    #[error("invalid job data: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

//! Messages pushed outward to the shell (UI / log consumer).
//!
//! Gateway events and cron firings share this one delivery path.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::events::{ApprovalRequested, ApprovalResolved, LogEntry};

/// Value delivered when a cron job fires. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronPayload {
    pub job_id: String,
    pub label: String,
    pub task: String,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellMessage {
    #[serde(rename = "gateway_approval_request")]
    ApprovalRequest(ApprovalRequested),
    #[serde(rename = "gateway_approval_resolved")]
    ApprovalResolved(ApprovalResolved),
    #[serde(rename = "log_entry")]
    LogEntry(LogEntry),
    #[serde(rename = "cron_fire")]
    CronFire(CronPayload),
}

impl ShellMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApprovalRequest(_) => "gateway_approval_request",
            Self::ApprovalResolved(_) => "gateway_approval_resolved",
            Self::LogEntry(_) => "log_entry",
            Self::CronFire(_) => "cron_fire",
        }
    }
}

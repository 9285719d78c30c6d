//! Typed proxies for the gateway-side cron mirror (`cron.*`).

use {
    naia_protocol::methods,
    serde::{Deserialize, Serialize},
    serde_json::json,
};

use crate::{client::GatewayClient, error::Result};

/// Schedule as the gateway reports it. Kept loose: the gateway may add kinds
/// this client does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSchedule {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCronJob {
    pub id: String,
    pub name: String,
    pub schedule: RemoteSchedule,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CronList {
    #[serde(default)]
    pub jobs: Vec<RemoteCronJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCronStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub job_count: u64,
    /// Unix milliseconds.
    #[serde(default)]
    pub next_wake: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddRemoteJob {
    pub name: String,
    pub schedule: RemoteSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteJobCreated {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJobRemoved {
    pub job_id: String,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJobRun {
    pub job_id: String,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRun {
    /// Unix milliseconds.
    pub fired_at: i64,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRuns {
    pub job_id: String,
    #[serde(default)]
    pub runs: Vec<RemoteRun>,
}

pub async fn list_jobs(client: &GatewayClient) -> Result<CronList> {
    client.call(methods::CRON_LIST, json!({})).await
}

pub async fn status(client: &GatewayClient) -> Result<RemoteCronStatus> {
    client.call(methods::CRON_STATUS, json!({})).await
}

pub async fn add_job(client: &GatewayClient, job: &AddRemoteJob) -> Result<RemoteJobCreated> {
    client.call(methods::CRON_ADD, job).await
}

pub async fn remove_job(client: &GatewayClient, job_id: &str) -> Result<RemoteJobRemoved> {
    client
        .call(methods::CRON_REMOVE, json!({ "jobId": job_id }))
        .await
}

pub async fn run_job(
    client: &GatewayClient,
    job_id: &str,
    mode: Option<&str>,
) -> Result<RemoteJobRun> {
    let mut params = json!({ "jobId": job_id });
    if let Some(mode) = mode {
        params["mode"] = json!(mode);
    }
    client.call(methods::CRON_RUN, params).await
}

pub async fn runs(client: &GatewayClient, job_id: &str, limit: Option<u32>) -> Result<RemoteRuns> {
    let mut params = json!({ "jobId": job_id });
    if let Some(limit) = limit {
        params["limit"] = json!(limit);
    }
    client.call(methods::CRON_RUNS, params).await
}

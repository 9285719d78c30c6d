//! Push events the client understands, and their payloads.
//!
//! Payloads are validated into these structs when they cross into the
//! dispatcher. Optional fields stay `None` when absent; they are never
//! defaulted.

use serde::{Deserialize, Serialize};

pub const EXEC_APPROVAL_REQUESTED: &str = "exec.approval.requested";
pub const EXEC_APPROVAL_RESOLVED: &str = "exec.approval.resolved";
pub const LOGS_ENTRY: &str = "logs.entry";

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// `exec.approval.requested`: the gateway wants a decision on a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequested {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

/// `exec.approval.resolved`: a decision was taken elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResolved {
    pub request_id: String,
    pub decision: Decision,
}

/// `logs.entry`: one gateway log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn log_entry_keeps_missing_fields_absent() {
        let entry: LogEntry = serde_json::from_value(json!({"level": "warn"})).unwrap();
        assert_eq!(entry.level.as_deref(), Some("warn"));
        assert_eq!(entry.message, None);
        assert_eq!(entry.timestamp, None);
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!({"level": "warn"}));
    }

    #[test]
    fn approval_requested_requires_request_id() {
        let err = serde_json::from_value::<ApprovalRequested>(json!({"toolName": "exec"}));
        assert!(err.is_err());

        let ok: ApprovalRequested = serde_json::from_value(json!({
            "requestId": "r1",
            "toolCallId": "tc1",
            "toolName": "execute_command",
            "args": {"command": "ls"}
        }))
        .unwrap();
        assert_eq!(ok.request_id, "r1");
        assert_eq!(ok.args, Some(json!({"command": "ls"})));
    }

    #[test]
    fn decision_wire_names() {
        assert_eq!(serde_json::to_value(Decision::Approve).unwrap(), json!("approve"));
        assert_eq!(Decision::Reject.as_str(), "reject");
    }
}

//! Approval bridge: ties an `exec.approval.requested` push to the decision
//! that later resolves it, plus the `exec.approvals.*` proxies.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use {
    naia_protocol::{Decision, methods},
    serde::{Deserialize, Serialize},
    serde_json::json,
    tokio::{sync::oneshot, time::Instant},
    tracing::debug,
};

use crate::{
    client::GatewayClient,
    error::{ClientError, Result},
};

/// How many resolved request ids are remembered for duplicate detection.
const RESOLVED_HISTORY: usize = 256;

/// An approval request waiting for a decision.
pub struct PendingApproval {
    pub request_id: String,
    pub requested_at: Instant,
    completion: oneshot::Sender<Decision>,
    waiter: Option<oneshot::Receiver<Decision>>,
}

#[derive(Default)]
struct BridgeState {
    pending: HashMap<String, PendingApproval>,
    resolved: VecDeque<String>,
    /// Ids with a resolution on its way to the gateway.
    resolving: HashSet<String>,
}

impl BridgeState {
    fn is_resolved(&self, request_id: &str) -> bool {
        self.resolved.iter().any(|id| id == request_id)
    }

    fn remember_resolved(&mut self, request_id: String) {
        if self.resolved.len() >= RESOLVED_HISTORY {
            self.resolved.pop_front();
        }
        self.resolved.push_back(request_id);
    }
}

/// Pending approvals keyed by request id. At most one entry per id; each
/// entry is completed at most once.
#[derive(Default)]
pub struct ApprovalBridge {
    state: Mutex<BridgeState>,
}

impl ApprovalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a pending approval. Returns false if one is already pending for
    /// this id (the existing entry is kept).
    pub fn record(&self, request_id: &str) -> bool {
        let mut state = self.state();
        if state.pending.contains_key(request_id) {
            debug!(request_id, "approval already pending");
            return false;
        }
        state.resolved.retain(|id| id != request_id);
        let (tx, rx) = oneshot::channel();
        state.pending.insert(request_id.to_string(), PendingApproval {
            request_id: request_id.to_string(),
            requested_at: Instant::now(),
            completion: tx,
            waiter: Some(rx),
        });
        true
    }

    /// Take the receiver a local decision point awaits. Only the first caller
    /// gets it.
    pub fn take_waiter(&self, request_id: &str) -> Option<oneshot::Receiver<Decision>> {
        self.state()
            .pending
            .get_mut(request_id)
            .and_then(|p| p.waiter.take())
    }

    /// Complete a pending approval.
    ///
    /// `Ok(true)` when an entry was completed, `Ok(false)` when the id was
    /// never bridged, [`ClientError::AlreadyResolved`] on a repeat.
    pub fn complete(&self, request_id: &str, decision: Decision) -> Result<bool> {
        let mut state = self.state();
        if state.is_resolved(request_id) {
            return Err(ClientError::AlreadyResolved(request_id.to_string()));
        }
        let Some(pending) = state.pending.remove(request_id) else {
            return Ok(false);
        };
        state.remember_resolved(request_id.to_string());
        drop(state);

        debug!(request_id, decision = decision.as_str(), "approval completed");
        let _ = pending.completion.send(decision);
        Ok(true)
    }

    /// Drop a pending approval without resolving it.
    pub fn forget(&self, request_id: &str) -> bool {
        self.state().pending.remove(request_id).is_some()
    }

    /// Reserve the right to send a resolution for `request_id`. Fails with
    /// [`ClientError::AlreadyResolved`] when the id is resolved or another
    /// resolution is in flight. The reservation ends when the claim drops.
    pub fn claim(&self, request_id: &str) -> Result<ResolutionClaim<'_>> {
        let mut state = self.state();
        if state.is_resolved(request_id) || !state.resolving.insert(request_id.to_string()) {
            return Err(ClientError::AlreadyResolved(request_id.to_string()));
        }
        Ok(ResolutionClaim {
            bridge: self,
            request_id: request_id.to_string(),
        })
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.state().pending.contains_key(request_id)
    }

    pub fn is_resolved(&self, request_id: &str) -> bool {
        self.state().is_resolved(request_id)
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every pending approval. Waiters observe a closed channel.
    pub fn clear(&self) {
        let mut state = self.state();
        state.pending.clear();
        state.resolved.clear();
    }
}

/// An in-flight resolution. See [`ApprovalBridge::claim`].
pub struct ResolutionClaim<'a> {
    bridge: &'a ApprovalBridge,
    request_id: String,
}

impl Drop for ResolutionClaim<'_> {
    fn drop(&mut self) {
        self.bridge.state().resolving.remove(&self.request_id);
    }
}

// ── Proxies ──────────────────────────────────────────────────────────────────

/// Result of `exec.approvals.resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResolution {
    pub request_id: String,
    #[serde(default)]
    pub resolved: bool,
}

/// Approval rules as returned by `exec.approvals.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRules {
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_patterns: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fields accepted by `exec.approvals.set`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRulesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RulesUpdated {
    #[serde(default)]
    pub updated: bool,
}

/// Resolve a bridged approval on the gateway, then complete it locally.
///
/// A second resolution for the same id, including one racing the first,
/// fails with [`ClientError::AlreadyResolved`] without reaching the wire.
/// A failed call releases the id so it can be resolved again.
pub async fn resolve_approval(
    client: &GatewayClient,
    request_id: &str,
    decision: Decision,
) -> Result<ApprovalResolution> {
    let bridge = client.approvals();
    let _claim = bridge.claim(request_id)?;

    let resolution: ApprovalResolution = client
        .call(
            methods::EXEC_APPROVALS_RESOLVE,
            json!({ "requestId": request_id, "decision": decision }),
        )
        .await?;

    // The gateway's own `exec.approval.resolved` may have completed it first.
    if let Err(e) = bridge.complete(request_id, decision) {
        debug!(request_id, error = %e, "approval completed remotely before response");
    }
    Ok(resolution)
}

pub async fn get_approval_rules(client: &GatewayClient) -> Result<ApprovalRules> {
    client.call(methods::EXEC_APPROVALS_GET, json!({})).await
}

pub async fn set_approval_rules(
    client: &GatewayClient,
    patch: &ApprovalRulesPatch,
) -> Result<RulesUpdated> {
    client.call(methods::EXEC_APPROVALS_SET, patch).await
}

//! Event dispatcher: routes gateway push events to the shell sinks.
//!
//! Handlers live in a table built once at construction and looked up by
//! exact event name. Names without a handler are dropped; that is the
//! forward-compatibility policy, not an error.

use std::{collections::HashMap, sync::Arc};

use {
    naia_protocol::{
        ApprovalRequested, ApprovalResolved, EventFrame, LogEntry, ShellMessage, events,
    },
    serde::de::DeserializeOwned,
    tracing::{debug, warn},
};

use crate::{approvals::ApprovalBridge, error::ClientError, sink::EventSink};

/// The sinks events are delivered to. Fixed for the client's lifetime.
#[derive(Clone)]
pub struct EventSinks {
    pub approvals: Arc<dyn EventSink>,
    pub logs: Arc<dyn EventSink>,
}

impl EventSinks {
    pub fn new(approvals: Arc<dyn EventSink>, logs: Arc<dyn EventSink>) -> Self {
        Self { approvals, logs }
    }

    /// Route everything to one sink.
    pub fn shared(sink: Arc<dyn EventSink>) -> Self {
        Self {
            approvals: Arc::clone(&sink),
            logs: sink,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    ApprovalRequested,
    ApprovalResolved,
    LogEntry,
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// No handler for this event name.
    Unknown,
    /// Payload did not match the event's schema; dropped.
    Malformed(String),
    /// The sink refused the message; logged and dropped.
    SinkFailed(String),
}

pub struct EventDispatcher {
    handlers: HashMap<&'static str, Handler>,
    sinks: EventSinks,
    approvals: Arc<ApprovalBridge>,
}

impl EventDispatcher {
    pub fn new(sinks: EventSinks, approvals: Arc<ApprovalBridge>) -> Self {
        let handlers = HashMap::from([
            (events::EXEC_APPROVAL_REQUESTED, Handler::ApprovalRequested),
            (events::EXEC_APPROVAL_RESOLVED, Handler::ApprovalResolved),
            (events::LOGS_ENTRY, Handler::LogEntry),
        ]);
        Self {
            handlers,
            sinks,
            approvals,
        }
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn dispatch(&self, frame: EventFrame) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(frame.event.as_str()).copied() else {
            debug!(event = %frame.event, "dropping unknown gateway event");
            return DispatchOutcome::Unknown;
        };

        let payload = frame
            .payload
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        match handler {
            Handler::ApprovalRequested => {
                let request: ApprovalRequested = match decode(&frame.event, payload) {
                    Ok(r) => r,
                    Err(outcome) => return outcome,
                };
                // Record before delivering so a decision taken synchronously by
                // the sink finds the entry.
                let request_id = request.request_id.clone();
                let recorded = self.approvals.record(&request_id);
                let outcome = deliver(
                    &self.sinks.approvals,
                    ShellMessage::ApprovalRequest(request),
                );
                // Nobody saw the request, so nobody will decide it.
                if recorded && matches!(outcome, DispatchOutcome::SinkFailed(_)) {
                    self.approvals.forget(&request_id);
                }
                outcome
            },
            Handler::ApprovalResolved => {
                let resolved: ApprovalResolved = match decode(&frame.event, payload) {
                    Ok(r) => r,
                    Err(outcome) => return outcome,
                };
                match self
                    .approvals
                    .complete(&resolved.request_id, resolved.decision)
                {
                    Ok(_) => {},
                    Err(ClientError::AlreadyResolved(id)) => {
                        debug!(request_id = %id, "approval already resolved locally");
                    },
                    Err(e) => warn!(error = %e, "failed to complete approval"),
                }
                deliver(
                    &self.sinks.approvals,
                    ShellMessage::ApprovalResolved(resolved),
                )
            },
            Handler::LogEntry => {
                let entry: LogEntry = match decode(&frame.event, payload) {
                    Ok(e) => e,
                    Err(outcome) => return outcome,
                };
                deliver(&self.sinks.logs, ShellMessage::LogEntry(entry))
            },
        }
    }
}

fn decode<T: DeserializeOwned>(
    event: &str,
    payload: serde_json::Value,
) -> Result<T, DispatchOutcome> {
    serde_json::from_value(payload).map_err(|e| {
        warn!(event, error = %e, "dropping malformed event payload");
        DispatchOutcome::Malformed(e.to_string())
    })
}

fn deliver(sink: &Arc<dyn EventSink>, message: ShellMessage) -> DispatchOutcome {
    let kind = message.kind();
    match sink.deliver(message) {
        Ok(()) => DispatchOutcome::Delivered,
        Err(e) => {
            warn!(kind, error = %e, "failed to deliver event to shell");
            DispatchOutcome::SinkFailed(e.to_string())
        },
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sink::ChannelSink,
        naia_protocol::Decision,
        serde_json::json,
        tokio::sync::mpsc,
    };

    struct FailingSink;

    impl EventSink for FailingSink {
        fn deliver(&self, _message: ShellMessage) -> anyhow::Result<()> {
            anyhow::bail!("shell went away")
        }
    }

    fn dispatcher() -> (
        EventDispatcher,
        Arc<ApprovalBridge>,
        mpsc::UnboundedReceiver<ShellMessage>,
        mpsc::UnboundedReceiver<ShellMessage>,
    ) {
        let (approvals_sink, approvals_rx) = ChannelSink::new();
        let (logs_sink, logs_rx) = ChannelSink::new();
        let bridge = Arc::new(ApprovalBridge::new());
        let dispatcher = EventDispatcher::new(
            EventSinks::new(Arc::new(approvals_sink), Arc::new(logs_sink)),
            Arc::clone(&bridge),
        );
        (dispatcher, bridge, approvals_rx, logs_rx)
    }

    #[test]
    fn logs_entry_is_forwarded_verbatim() {
        let (dispatcher, _, mut approvals, mut logs) = dispatcher();
        let outcome = dispatcher.dispatch(EventFrame::new(
            "logs.entry",
            Some(json!({"level": "info", "message": "x", "timestamp": 123})),
        ));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(
            logs.try_recv().unwrap(),
            ShellMessage::LogEntry(LogEntry {
                level: Some("info".into()),
                message: Some("x".into()),
                timestamp: Some(123),
            })
        );
        assert!(approvals.try_recv().is_err());
    }

    #[test]
    fn logs_entry_without_payload_keeps_fields_absent() {
        let (dispatcher, _, _, mut logs) = dispatcher();
        let outcome = dispatcher.dispatch(EventFrame::new("logs.entry", None));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(
            logs.try_recv().unwrap(),
            ShellMessage::LogEntry(LogEntry {
                level: None,
                message: None,
                timestamp: None,
            })
        );
    }

    #[test]
    fn unknown_event_reaches_no_sink() {
        let (dispatcher, _, mut approvals, mut logs) = dispatcher();
        let outcome = dispatcher.dispatch(EventFrame::new("some.unknown.event", Some(json!({}))));
        assert_eq!(outcome, DispatchOutcome::Unknown);
        assert!(approvals.try_recv().is_err());
        assert!(logs.try_recv().is_err());
        assert!(!dispatcher.handles("some.unknown.event"));
    }

    #[test]
    fn approval_request_is_bridged_and_forwarded() {
        let (dispatcher, bridge, mut approvals, mut logs) = dispatcher();
        let outcome = dispatcher.dispatch(EventFrame::new(
            "exec.approval.requested",
            Some(json!({
                "requestId": "req-1",
                "toolCallId": "tc-1",
                "toolName": "execute_command",
                "args": {"command": "ls"}
            })),
        ));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert!(bridge.is_pending("req-1"));

        let ShellMessage::ApprovalRequest(request) = approvals.try_recv().unwrap() else {
            panic!("expected approval request");
        };
        assert_eq!(request.tool_call_id.as_deref(), Some("tc-1"));
        assert_eq!(request.tool_name.as_deref(), Some("execute_command"));
        assert_eq!(request.args, Some(json!({"command": "ls"})));
        assert!(logs.try_recv().is_err());
    }

    #[tokio::test]
    async fn remote_resolution_completes_pending_approval() {
        let (dispatcher, bridge, mut approvals, _) = dispatcher();
        dispatcher.dispatch(EventFrame::new(
            "exec.approval.requested",
            Some(json!({"requestId": "req-2"})),
        ));
        let waiter = bridge.take_waiter("req-2").unwrap();
        approvals.try_recv().unwrap();

        let outcome = dispatcher.dispatch(EventFrame::new(
            "exec.approval.resolved",
            Some(json!({"requestId": "req-2", "decision": "reject"})),
        ));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(waiter.await.unwrap(), Decision::Reject);
        assert!(bridge.is_resolved("req-2"));

        // A duplicate push is still forwarded but does not complete twice.
        let outcome = dispatcher.dispatch(EventFrame::new(
            "exec.approval.resolved",
            Some(json!({"requestId": "req-2", "decision": "approve"})),
        ));
        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let (dispatcher, bridge, mut approvals, mut logs) = dispatcher();
        let outcome = dispatcher.dispatch(EventFrame::new(
            "exec.approval.requested",
            Some(json!({"toolName": "exec"})),
        ));
        assert!(matches!(outcome, DispatchOutcome::Malformed(_)));
        assert!(bridge.pending_ids().is_empty());
        assert!(approvals.try_recv().is_err());

        let outcome = dispatcher.dispatch(EventFrame::new(
            "logs.entry",
            Some(json!({"timestamp": "yesterday"})),
        ));
        assert!(matches!(outcome, DispatchOutcome::Malformed(_)));
        assert!(logs.try_recv().is_err());
    }

    #[test]
    fn sink_failure_is_reported_not_raised() {
        let dispatcher = EventDispatcher::new(
            EventSinks::shared(Arc::new(FailingSink)),
            Arc::new(ApprovalBridge::new()),
        );
        let outcome = dispatcher.dispatch(EventFrame::new("logs.entry", None));
        assert!(matches!(outcome, DispatchOutcome::SinkFailed(_)));
    }

    #[test]
    fn undelivered_approval_is_not_left_pending() {
        let bridge = Arc::new(ApprovalBridge::new());
        let dispatcher =
            EventDispatcher::new(EventSinks::shared(Arc::new(FailingSink)), Arc::clone(&bridge));
        let outcome = dispatcher.dispatch(EventFrame::new(
            "exec.approval.requested",
            Some(json!({"requestId": "lost", "toolName": "exec"})),
        ));
        assert!(matches!(outcome, DispatchOutcome::SinkFailed(_)));
        assert!(!bridge.is_pending("lost"));
        assert!(!bridge.is_resolved("lost"));
    }
}

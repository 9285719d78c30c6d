//! Control-plane wire protocol shared by the gateway client and the cron engine.
//!
//! Every message on the connection is one JSON object tagged by `type`:
//! `request` (client → gateway), `response` (gateway → client, correlated by
//! `id`) or `event` (unsolicited gateway push).

pub mod events;
pub mod methods;
pub mod shell;

use serde::{Deserialize, Serialize};

pub use {
    events::{ApprovalRequested, ApprovalResolved, Decision, LogEntry},
    shell::{CronPayload, ShellMessage},
};

/// Timeout applied to a request when the caller does not pick one.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Error codes the gateway uses in `error.code`.
pub mod error_codes {
    pub const UNKNOWN: &str = "UNKNOWN";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
}

/// Failure reported by the gateway, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Parameters presented while opening the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub token: String,
}

impl ConnectParams {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Collapse the `ok`/`payload`/`error` triple into a single outcome.
    ///
    /// A successful response without payload yields `Value::Null`; a failed
    /// one without an error object yields an `UNKNOWN` error.
    pub fn into_outcome(self) -> Result<serde_json::Value, ErrorShape> {
        if self.ok {
            Ok(self.payload.unwrap_or(serde_json::Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| {
                ErrorShape::new(
                    error_codes::UNKNOWN,
                    "gateway reported failure without an error",
                )
            }))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayFrame {
    Request(RequestFrame),
    Response(ResponseFrame),
    Event(EventFrame),
}

impl GatewayFrame {
    pub fn request(
        id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self::Request(RequestFrame {
            id: id.into(),
            method: method.into(),
            params,
        })
    }
}

pub fn decode_frame(raw: &str) -> Result<GatewayFrame, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_frame(frame: &GatewayFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn request_frame_wire_shape() {
        let frame = GatewayFrame::request("7", "health", json!({}));
        let value: serde_json::Value =
            serde_json::from_str(&encode_frame(&frame).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "request", "id": "7", "method": "health", "params": {}})
        );
    }

    #[test]
    fn decodes_ok_response() {
        let frame = decode_frame(r#"{"type":"response","id":"1","ok":true,"payload":{"a":1}}"#)
            .unwrap();
        let GatewayFrame::Response(resp) = frame else {
            panic!("expected response");
        };
        assert_eq!(resp.into_outcome().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn decodes_error_response() {
        let raw = r#"{"type":"response","id":"2","ok":false,"error":{"code":"UNAVAILABLE","message":"down"}}"#;
        let GatewayFrame::Response(resp) = decode_frame(raw).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(
            resp.into_outcome().unwrap_err(),
            ErrorShape::new("UNAVAILABLE", "down")
        );
    }

    #[test]
    fn ok_response_without_payload_is_null() {
        let outcome = ResponseFrame {
            id: "3".into(),
            ok: true,
            payload: None,
            error: None,
        }
        .into_outcome();
        assert_eq!(outcome.unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn failed_response_without_error_gets_unknown_code() {
        let outcome = ResponseFrame {
            id: "4".into(),
            ok: false,
            payload: None,
            error: None,
        }
        .into_outcome();
        assert_eq!(outcome.unwrap_err().code, error_codes::UNKNOWN);
    }

    #[test]
    fn event_without_payload() {
        let frame = decode_frame(r#"{"type":"event","event":"logs.entry"}"#).unwrap();
        assert_eq!(frame, GatewayFrame::Event(EventFrame::new("logs.entry", None)));
    }

    #[test]
    fn unknown_frame_type_is_malformed() {
        assert!(decode_frame(r#"{"type":"hello","id":"1"}"#).is_err());
        assert!(decode_frame("not json").is_err());
    }
}

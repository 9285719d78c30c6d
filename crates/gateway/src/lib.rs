//! Gateway client: one persistent connection to the control-plane gateway.
//!
//! Layers, leaves first:
//! 1. `transport`: opens the connection, moves JSON text frames
//! 2. `pending`: correlates responses with outstanding requests
//! 3. `events`: routes pushed events to the shell sinks, feeds the approval bridge
//! 4. `client`: the facade everything else talks to
//!
//! `approvals` and `cron_proxy` are typed proxies built on
//! [`GatewayClient::call`].

pub mod approvals;
pub mod client;
pub mod cron_proxy;
pub mod error;
pub mod events;
pub mod pending;
pub mod sink;
pub mod transport;

pub use {
    approvals::{ApprovalBridge, resolve_approval},
    client::{ConnectOptions, ConnectionState, GatewayClient, GatewayClientBuilder},
    error::{ClientError, Result},
    events::{DispatchOutcome, EventDispatcher, EventSinks},
    sink::{ChannelSink, EventSink, JsonLineSink},
    transport::{ChannelConnector, Connector, WsConnector},
};

//! Transport: one persistent bidirectional connection carrying JSON text frames.
//!
//! Nothing above this module knows about sockets. A [`Connector`] opens a
//! [`Connection`], which is just a pair of channels: frames pushed into
//! `outbound` are written to the peer, frames read from the peer arrive on
//! `inbound` until it hangs up.

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_tungstenite::tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
    tracing::{debug, trace, warn},
};

use naia_protocol::ConnectParams;

use crate::error::{ClientError, Result};

/// Opens connections to a gateway endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the connection and complete the handshake. Must only return once
    /// the peer has confirmed the connection is open.
    async fn open(&self, url: &str, params: &ConnectParams) -> Result<Connection>;
}

/// An open connection.
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
    tasks: TransportTasks,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            tasks: TransportTasks::default(),
        }
    }

    pub fn with_tasks(mut self, tasks: TransportTasks) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
        TransportTasks,
    ) {
        (self.outbound, self.inbound, self.tasks)
    }
}

/// Background I/O tasks owned by a connection.
#[derive(Default)]
pub struct TransportTasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl TransportTasks {
    pub fn new(reader: JoinHandle<()>, writer: JoinHandle<()>) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// Stop reading. The writer drains and closes the socket on its own once
    /// every outbound sender is dropped.
    pub fn shutdown(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // Detach: the writer ends when its channel closes.
        drop(self.writer.take());
    }
}

// ── WebSocket ────────────────────────────────────────────────────────────────

/// WebSocket transport. The token is presented as a bearer token on the
/// upgrade request.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str, params: &ConnectParams) -> Result<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::Transport(format!("invalid gateway url {url}: {e}")))?;
        if !params.token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", params.token))
                .map_err(|e| ClientError::Transport(format!("invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::Transport(format!("failed to connect to {url}: {e}")))?;
        debug!(url, "websocket upgrade complete");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                trace!(raw = %frame, "client -> gateway");
                if let Err(e) = sink.send(Message::text(frame)).await {
                    warn!(error = %e, "failed to write to gateway socket");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "gateway sent close");
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        warn!(error = %e, "error reading from gateway socket");
                        break;
                    },
                }
            }
            debug!("gateway socket reader finished");
        });

        Ok(Connection::new(out_tx, in_rx).with_tasks(TransportTasks::new(reader, writer)))
    }
}

// ── In-process ───────────────────────────────────────────────────────────────

/// The gateway side of an in-process connection.
pub struct RemoteEnd {
    pub url: String,
    pub params: ConnectParams,
    /// Frames written by the client.
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Frames delivered to the client. Dropping it hangs up.
    pub to_client: mpsc::UnboundedSender<String>,
}

/// Connector over in-memory channels, for embedding and tests. Every opened
/// connection hands its gateway side to the receiver returned by [`new`].
///
/// [`new`]: ChannelConnector::new
pub struct ChannelConnector {
    remotes: Option<mpsc::UnboundedSender<RemoteEnd>>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { remotes: Some(tx) }, rx)
    }

    /// A connector whose every open attempt fails.
    pub fn refusing() -> Self {
        Self { remotes: None }
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn open(&self, url: &str, params: &ConnectParams) -> Result<Connection> {
        let remotes = self
            .remotes
            .as_ref()
            .ok_or_else(|| ClientError::Transport(format!("connection to {url} refused")))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        remotes
            .send(RemoteEnd {
                url: url.to_string(),
                params: params.clone(),
                from_client: out_rx,
                to_client: in_tx,
            })
            .map_err(|_| ClientError::Transport(format!("connection to {url} refused")))?;

        Ok(Connection::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_connector_hands_out_remote_end() {
        let (connector, mut remotes) = ChannelConnector::new();
        let connection = connector
            .open("mem://gw", &ConnectParams::new("t0k"))
            .await
            .unwrap();
        let mut remote = remotes.recv().await.unwrap();
        assert_eq!(remote.url, "mem://gw");
        assert_eq!(remote.params.token, "t0k");

        let (outbound, mut inbound, _tasks) = connection.into_parts();
        outbound.send("ping".into()).unwrap();
        assert_eq!(remote.from_client.recv().await.as_deref(), Some("ping"));
        remote.to_client.send("pong".into()).unwrap();
        assert_eq!(inbound.recv().await.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn refusing_connector_fails() {
        let result = ChannelConnector::refusing()
            .open("mem://gw", &ConnectParams::default())
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn ws_connector_rejects_bad_url() {
        let result = WsConnector
            .open("not a url", &ConnectParams::new("x"))
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}

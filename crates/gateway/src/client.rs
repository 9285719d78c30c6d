//! Gateway client facade: the one object proxies and the cron engine use.
//!
//! Composes a [`Connector`], the request [`Correlator`] and the
//! [`EventDispatcher`] over a single connection. State changes only through
//! explicit [`connect`](GatewayClient::connect) and
//! [`close`](GatewayClient::close) calls; the client never reconnects on its
//! own.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    naia_protocol::{
        ConnectParams, DEFAULT_REQUEST_TIMEOUT_MS, GatewayFrame, decode_frame, encode_frame,
    },
    serde::{Serialize, de::DeserializeOwned},
    tokio::{
        sync::{Mutex, mpsc, watch},
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    approvals::ApprovalBridge,
    error::{ClientError, Result},
    events::{EventDispatcher, EventSinks},
    pending::{Correlator, PendingGuard},
    transport::{Connector, TransportTasks, WsConnector},
};

/// How often orphaned pending requests are swept while connected.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Options for [`GatewayClient::connect`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub token: String,
}

impl ConnectOptions {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// State shared with the read loop.
struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Bumped on every connect and close so a stale read loop can tell its
    /// connection is gone.
    generation: AtomicU64,
    correlator: Correlator,
    dispatcher: EventDispatcher,
    approvals: Arc<ApprovalBridge>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        self.state.send_replace(next)
    }

    fn handle_frame(&self, raw: &str) {
        trace!(raw, "gateway -> client");
        match decode_frame(raw) {
            Ok(GatewayFrame::Response(response)) => {
                self.correlator.resolve(response);
            },
            Ok(GatewayFrame::Event(event)) => {
                self.dispatcher.dispatch(event);
            },
            Ok(GatewayFrame::Request(request)) => {
                warn!(id = %request.id, method = %request.method, "dropping unsupported gateway request");
            },
            Err(e) => warn!(error = %e, "dropping malformed gateway frame"),
        }
    }

    /// The remote end went away without a `close()`.
    fn on_hangup(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let dropped = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if dropped {
            let failed = self.correlator.fail_all(|| ClientError::ConnectionClosed);
            self.approvals.clear();
            warn!(failed, "gateway connection lost");
        }
    }
}

/// Live connection resources.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    transport: TransportTasks,
}

impl Link {
    fn shutdown(self) {
        self.reader.abort();
        self.transport.shutdown();
        drop(self.outbound);
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    request_timeout: Duration,
    link: Mutex<Option<Link>>,
    shared: Arc<Shared>,
}

/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

pub struct GatewayClientBuilder {
    sinks: EventSinks,
    connector: Arc<dyn Connector>,
    request_timeout: Duration,
}

impl GatewayClientBuilder {
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> GatewayClient {
        let approvals = Arc::new(ApprovalBridge::new());
        let shared = Arc::new(Shared {
            state: watch::Sender::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            correlator: Correlator::new(),
            dispatcher: EventDispatcher::new(self.sinks, Arc::clone(&approvals)),
            approvals,
        });
        GatewayClient {
            inner: Arc::new(Inner {
                connector: self.connector,
                request_timeout: self.request_timeout,
                link: Mutex::new(None),
                shared,
            }),
        }
    }
}

impl GatewayClient {
    /// Client over WebSocket with the default request timeout. Sinks are
    /// fixed for the client's lifetime.
    pub fn new(sinks: EventSinks) -> Self {
        Self::builder(sinks).build()
    }

    pub fn builder(sinks: EventSinks) -> GatewayClientBuilder {
        GatewayClientBuilder {
            sinks,
            connector: Arc::new(WsConnector),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    /// Open the connection. Any failure before the transport confirms the
    /// connection leaves the client `Disconnected`.
    pub async fn connect(&self, url: &str, options: ConnectOptions) -> Result<()> {
        let mut link = self.inner.link.lock().await;
        let shared = &self.inner.shared;
        if *shared.state.borrow() == ConnectionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        if let Some(stale) = link.take() {
            stale.shutdown();
        }

        shared.set_state(ConnectionState::Connecting);
        let params = ConnectParams::new(options.token);
        let connection = match self.inner.connector.open(url, &params).await {
            Ok(connection) => connection,
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!(url, error = %e, "failed to connect to gateway");
                return Err(match e {
                    ClientError::Transport(_) => e,
                    other => ClientError::Transport(other.to_string()),
                });
            },
        };

        let (outbound, inbound, transport) = connection.into_parts();
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.set_state(ConnectionState::Connected);
        let reader = tokio::spawn(read_loop(Arc::clone(shared), inbound, generation));
        *link = Some(Link {
            outbound,
            reader,
            transport,
        });

        info!(url, "connected to gateway");
        Ok(())
    }

    /// Send a request with the client's default timeout.
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.request_with_timeout(method, params, self.inner.request_timeout)
            .await
    }

    /// Send a request and wait for the matching response.
    ///
    /// Fails with [`ClientError::NotConnected`] before anything is sent when
    /// the client is not connected. Never retried.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let (outbound, generation) = self.outbound().await?;
        self.send_request(outbound, generation, method, params, timeout)
            .await
    }

    async fn send_request(
        &self,
        outbound: mpsc::UnboundedSender<String>,
        generation: u64,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let shared = &self.inner.shared;
        let correlator = &shared.correlator;

        let (id, mut rx) = correlator.register(method, timeout);
        let _guard = PendingGuard::new(correlator, id.clone());
        // A close or reconnect that ran since `outbound()` has already failed
        // everything pending; this entry registered too late to be among them.
        if shared.generation.load(Ordering::SeqCst) != generation || !self.is_connected() {
            return Err(ClientError::ConnectionClosed);
        }

        let frame = encode_frame(&GatewayFrame::request(id.clone(), method, params))?;
        trace!(raw = %frame, "client -> gateway");
        if outbound.send(frame).is_err() {
            return Err(ClientError::ConnectionClosed);
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => match correlator.cancel(&id) {
                Some(_) => {
                    debug!(id = %id, method, "request timed out");
                    Err(ClientError::Timeout {
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                },
                // Completed concurrently with the deadline.
                None => rx
                    .try_recv()
                    .unwrap_or(Err(ClientError::ConnectionClosed)),
            },
        }
    }

    /// Typed request: serializes `params` and deserializes the payload.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: impl Serialize) -> Result<T> {
        let params = serde_json::to_value(params)?;
        let payload = self.request(method, params).await?;
        serde_json::from_value(payload).map_err(|source| ClientError::UnexpectedPayload {
            method: method.to_string(),
            source,
        })
    }

    /// Tear down the connection and fail everything pending with
    /// [`ClientError::ConnectionClosed`]. Idempotent.
    pub async fn close(&self) {
        let link = self.inner.link.lock().await.take();
        let shared = &self.inner.shared;
        let previous = shared.set_state(ConnectionState::Closed);
        shared.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(link) = link {
            link.shutdown();
        }
        let failed = shared.correlator.fail_all(|| ClientError::ConnectionClosed);
        shared.approvals.clear();

        if previous != ConnectionState::Closed {
            info!(failed, "gateway client closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    pub fn approvals(&self) -> &Arc<ApprovalBridge> {
        &self.inner.shared.approvals
    }

    pub fn pending_count(&self) -> usize {
        self.inner.shared.correlator.len()
    }

    /// The live sender and the generation it belongs to.
    async fn outbound(&self) -> Result<(mpsc::UnboundedSender<String>, u64)> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let link = self.inner.link.lock().await;
        match link.as_ref() {
            Some(link) if self.is_connected() => Ok((
                link.outbound.clone(),
                self.inner.shared.generation.load(Ordering::SeqCst),
            )),
            _ => Err(ClientError::NotConnected),
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut inbound: mpsc::UnboundedReceiver<String>,
    generation: u64,
) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(raw) => shared.handle_frame(&raw),
                None => break,
            },
            _ = sweep.tick() => {
                shared.correlator.sweep_expired(Instant::now());
            },
        }
    }

    debug!(generation, "gateway read loop finished");
    shared.on_hangup(generation);
}

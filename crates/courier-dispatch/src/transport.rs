//! Transport seams consumed by the dispatcher.
//!
//! Two mechanisms carry requests: a persistent multiplexed connection owned
//! elsewhere, and standalone calls over a cached [`Agent`]. Both receive a
//! fully built [`WireRequest`] and hand back a [`RawResponse`]; neither
//! classifies statuses.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent::Agent;
use crate::credentials::Credentials;
use crate::error::{DispatchError, Result};
use crate::headers::Headers;
use crate::request::Method;
use crate::response::{RawResponse, ResponseBody};

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Final header set, authentication included.
    pub headers: Headers,
    /// Encoded body.
    pub body: Option<Bytes>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Leave the response body unread so the caller can stream it.
    pub stream_body: bool,
}

/// State of the multiplexed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketStatus {
    /// Handshake in progress.
    Connecting,
    /// Ready for requests.
    Open,
    /// Shutting down.
    Closing,
    /// Not connected.
    Closed,
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketStatus::Connecting => "connecting",
            SocketStatus::Open => "open",
            SocketStatus::Closing => "closing",
            SocketStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Notifications raised by the multiplexed transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotice {
    /// The connection changed state.
    StatusChange(SocketStatus),
    /// The server rejected the credentials the connection authenticated with.
    AuthError,
}

/// Persistent duplex connection carrying interleaved request/response pairs.
#[async_trait]
pub trait MultiplexedTransport: Send + Sync + 'static {
    /// Whether requests can be sent right now.
    fn is_connected(&self) -> bool;

    /// Sends one request and waits for its response.
    async fn send(&self, request: &WireRequest) -> Result<RawResponse>;

    /// (Re)authenticates the connection with `credentials`.
    async fn authenticate(&self, credentials: &Credentials) -> Result<()>;

    /// Drops the authenticated connection.
    async fn logout(&self) -> Result<()>;

    /// Current connection state.
    fn status(&self) -> SocketStatus;

    /// Subscribes to status changes and auth failures.
    fn subscribe(&self) -> broadcast::Receiver<TransportNotice>;

    /// Forces a reconnect.
    async fn reconnect(&self) -> Result<()>;
}

/// One-shot request/response exchange over a cached agent.
#[async_trait]
pub trait StandaloneTransport: Send + Sync + 'static {
    /// Performs `request` using `agent`'s connection pool.
    async fn send(&self, request: &WireRequest, agent: &Agent) -> Result<RawResponse>;
}

/// [`StandaloneTransport`] backed by the agent's `reqwest` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl HttpTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Option<Duration>) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout {
            timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    } else {
        DispatchError::transport(err.to_string())
    }
}

#[async_trait]
impl StandaloneTransport for HttpTransport {
    async fn send(&self, request: &WireRequest, agent: &Agent) -> Result<RawResponse> {
        let mut builder = agent
            .client()
            .request(request.method.into(), request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let timeout = request.timeout;
        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let body = if request.stream_body {
            ResponseBody::Streaming(
                response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| map_reqwest_error(e, timeout)))
                    .boxed(),
            )
        } else {
            ResponseBody::Buffered(
                response
                    .bytes()
                    .await
                    .map_err(|e| map_reqwest_error(e, timeout))?,
            )
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

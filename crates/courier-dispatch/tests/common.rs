//! Common test utilities: scripted transports and dispatcher fixtures.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use courier_dispatch::agent::Agent;
use courier_dispatch::response::{RawResponse, ResponseBody};
use courier_dispatch::transport::{
    MultiplexedTransport, SocketStatus, StandaloneTransport, TransportNotice, WireRequest,
};
use courier_dispatch::{Credentials, DispatchConfig, DispatchError, Dispatcher, Headers, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

/// One scripted reaction of a mock transport.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer with status, headers and body.
    Reply(u16, Vec<(&'static str, String)>, Bytes),
    /// Answer 200 with the request body and its content type.
    Echo,
    /// Fail before any response.
    TransportError,
    /// Never answer.
    Hang,
    /// Answer 200 with a streamed body; optionally stall after the chunks.
    Stream(Vec<Bytes>, bool),
}

impl Scripted {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Scripted::Reply(
            status,
            vec![("content-type", "application/json".to_string())],
            Bytes::from(body.to_string()),
        )
    }

    pub fn status(status: u16) -> Self {
        Scripted::Reply(status, Vec::new(), Bytes::new())
    }
}

/// Request seen by a mock transport.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub wire: WireRequest,
    pub agent_id: Option<u64>,
    pub at: Instant,
}

async fn react(script: Scripted, request: &WireRequest) -> Result<RawResponse> {
    match script {
        Scripted::Reply(status, headers, body) => {
            let mut h = Headers::new();
            for (name, value) in headers {
                h.append(name, value);
            }
            Ok(RawResponse::buffered(status, h, body))
        }
        Scripted::Echo => {
            let mut h = Headers::new();
            if let Some(ct) = request.headers.get("content-type") {
                h.insert("content-type", ct);
            }
            Ok(RawResponse::buffered(
                200,
                h,
                request.body.clone().unwrap_or_default(),
            ))
        }
        Scripted::TransportError => Err(DispatchError::transport("connection refused")),
        Scripted::Hang => futures::future::pending().await,
        Scripted::Stream(chunks, stall) => {
            let chunks = stream::iter(chunks.into_iter().map(Ok));
            let body = if stall {
                chunks.chain(stream::pending()).boxed()
            } else {
                chunks.boxed()
            };
            Ok(RawResponse {
                status: 200,
                headers: Headers::new(),
                body: ResponseBody::Streaming(body),
            })
        }
    }
}

/// Scripted stand-in for the `reqwest` transport.
#[derive(Default)]
pub struct MockStandalone {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockStandalone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Scripted>) -> Arc<Self> {
        let mock = Self::default();
        *mock.script.lock().unwrap() = script.into();
        Arc::new(mock)
    }

    pub fn push(&self, script: Scripted) {
        self.script.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl StandaloneTransport for MockStandalone {
    async fn send(&self, request: &WireRequest, agent: &Agent) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(Recorded {
            wire: request.clone(),
            agent_id: Some(agent.id()),
            at: Instant::now(),
        });
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::json(200, serde_json::json!({})));
        react(next, request).await
    }
}

/// Scripted multiplexed connection.
pub struct MockMultiplexed {
    connected: AtomicBool,
    status: Mutex<SocketStatus>,
    notices: broadcast::Sender<TransportNotice>,
    requests: Mutex<Vec<Recorded>>,
    pub authenticated: Mutex<Option<Credentials>>,
    pub logouts: AtomicUsize,
    pub reconnects: AtomicUsize,
}

impl MockMultiplexed {
    pub fn connected() -> Arc<Self> {
        let (notices, _) = broadcast::channel(16);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            status: Mutex::new(SocketStatus::Open),
            notices,
            requests: Mutex::new(Vec::new()),
            authenticated: Mutex::new(None),
            logouts: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn notify(&self, notice: TransportNotice) {
        if let TransportNotice::StatusChange(status) = &notice {
            *self.status.lock().unwrap() = *status;
        }
        let _ = self.notices.send(notice);
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MultiplexedTransport for MockMultiplexed {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &WireRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(Recorded {
            wire: request.clone(),
            agent_id: None,
            at: Instant::now(),
        });
        react(Scripted::json(200, serde_json::json!({"via": "ws"})), request).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        *self.authenticated.lock().unwrap() = Some(credentials.clone());
        self.set_connected(true);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        *self.authenticated.lock().unwrap() = None;
        self.set_connected(false);
        Ok(())
    }

    fn status(&self) -> SocketStatus {
        *self.status.lock().unwrap()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportNotice> {
        self.notices.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Configuration pointing at `chat.example.org` with two CDNs.
pub fn test_config() -> DispatchConfig {
    let mut config = DispatchConfig {
        service_url: "https://chat.example.org".to_string(),
        version: "7.1.0".to_string(),
        ..Default::default()
    };
    config
        .cdn_urls
        .insert("0".to_string(), "https://cdn.example.org".to_string());
    config
        .cdn_urls
        .insert("2".to_string(), "https://cdn2.example.org".to_string());
    config
}

/// Dispatcher over `standalone` with logged-in credentials.
pub fn dispatcher(standalone: Arc<MockStandalone>) -> Dispatcher {
    Dispatcher::builder(test_config())
        .with_credentials(Credentials::new("alice.1", "hunter2"))
        .with_standalone(standalone)
        .build()
        .unwrap()
}

/// Dispatcher over `standalone` with a custom configuration.
pub fn dispatcher_with_config(config: DispatchConfig, standalone: Arc<MockStandalone>) -> Dispatcher {
    Dispatcher::builder(config)
        .with_credentials(Credentials::new("alice.1", "hunter2"))
        .with_standalone(standalone)
        .build()
        .unwrap()
}

/// Dispatcher over both mock transports; needs a runtime.
pub fn dispatcher_with_ws(
    standalone: Arc<MockStandalone>,
    multiplexed: Arc<MockMultiplexed>,
) -> Dispatcher {
    Dispatcher::builder(test_config())
        .with_credentials(Credentials::new("alice.1", "hunter2"))
        .with_standalone(standalone)
        .with_multiplexed(multiplexed)
        .build()
        .unwrap()
}

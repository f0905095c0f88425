//! Request executor: one attempt of a call, from descriptor to classified outcome.
//!
//! The executor picks a transport, builds the final header set (exactly one
//! authentication header), runs the wire call under the descriptor's timeout
//! and cancellation token, classifies the status and converts the body into
//! the requested shape. The timeout is one deadline covering both the send
//! and the body read. Retrying is layered on top by [`crate::retry`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{AgentCache, AuthClass};
use crate::config::DispatchConfig;
use crate::constants::{
    ACCESS_KEY_HEADER, AUTHORIZATION_HEADER, CLIENT_AGENT_HEADER, CONTENT_LENGTH_HEADER,
    CONTENT_TYPE_HEADER, USER_AGENT_HEADER,
};
use crate::credentials::CredentialStore;
use crate::error::{DispatchError, Result};
use crate::events::{DispatchEvent, EventBus};
use crate::headers::Headers;
use crate::request::{Body, RequestDescriptor, ResponseShape};
use crate::response::{
    check_schema, is_json_content_type, is_success, ByteStream, Outcome, RawResponse,
    ResponseData, ResponseMeta, WithDetails,
};
use crate::transport::{MultiplexedTransport, StandaloneTransport, WireRequest};

/// Executes single attempts of dispatcher requests.
pub struct RequestExecutor {
    user_agent: String,
    client_agent: String,
    service_host: Option<String>,
    credentials: Arc<CredentialStore>,
    agents: Arc<AgentCache>,
    standalone: Arc<dyn StandaloneTransport>,
    multiplexed: Option<Arc<dyn MultiplexedTransport>>,
    events: EventBus,
}

impl RequestExecutor {
    /// Creates an executor that only uses standalone calls.
    pub fn new(
        config: &DispatchConfig,
        credentials: Arc<CredentialStore>,
        agents: Arc<AgentCache>,
        standalone: Arc<dyn StandaloneTransport>,
        events: EventBus,
    ) -> Self {
        Self {
            user_agent: config.user_agent(),
            client_agent: config.client_agent.clone(),
            service_host: config.service_host(),
            credentials,
            agents,
            standalone,
            multiplexed: None,
            events,
        }
    }

    /// Routes multiplexable requests over `transport` while it is connected.
    pub fn with_multiplexed(mut self, transport: Arc<dyn MultiplexedTransport>) -> Self {
        self.multiplexed = Some(transport);
        self
    }

    /// Shared credential store read by every request build.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Multiplexed transport, if one is configured.
    pub fn multiplexed(&self) -> Option<&Arc<dyn MultiplexedTransport>> {
        self.multiplexed.as_ref()
    }

    /// Returns `true` if `desc` would travel over the multiplexed transport now.
    pub fn uses_multiplexed(&self, desc: &RequestDescriptor) -> bool {
        desc.multiplexable
            && self
                .multiplexed
                .as_ref()
                .map_or(false, |transport| transport.is_connected())
    }

    /// Builds the request as it will appear on the wire.
    pub fn build_wire(&self, desc: &RequestDescriptor) -> WireRequest {
        let mut headers = Headers::new();
        headers.insert(USER_AGENT_HEADER, &self.user_agent);
        headers.insert(CLIENT_AGENT_HEADER, &self.client_agent);
        headers.merge(&desc.headers);

        if let Some(Body::Bytes(bytes)) = &desc.body {
            headers.insert(CONTENT_LENGTH_HEADER, bytes.len().to_string());
        }

        headers.remove(AUTHORIZATION_HEADER);
        headers.remove(ACCESS_KEY_HEADER);
        if let Some((name, value)) = self.auth_header(desc) {
            headers.insert(name, value);
        }

        if let Some(content_type) = &desc.content_type {
            headers.insert(CONTENT_TYPE_HEADER, content_type);
        }

        WireRequest {
            method: desc.method,
            url: desc.url.clone(),
            headers,
            body: desc.body.as_ref().map(Body::to_bytes),
            timeout: desc.timeout,
            stream_body: desc.shape == ResponseShape::Stream,
        }
    }

    /// Access key, then explicit basic auth, then credentials (authenticated only).
    fn auth_header(&self, desc: &RequestDescriptor) -> Option<(&'static str, String)> {
        if desc.is_unauthenticated() {
            if let Some(key) = &desc.access_key {
                return Some((ACCESS_KEY_HEADER, key.clone()));
            }
        }
        if let Some(token) = &desc.basic_auth {
            return Some((AUTHORIZATION_HEADER, format!("Basic {token}")));
        }
        if desc.is_unauthenticated() {
            return None;
        }
        let basic = match &desc.credentials {
            Some(credentials) => credentials.basic_auth(),
            None => self.credentials.snapshot().basic_auth(),
        };
        basic.map(|value| (AUTHORIZATION_HEADER, value))
    }

    /// Performs one attempt of `desc`.
    pub async fn execute(&self, desc: &RequestDescriptor) -> Result<Outcome> {
        let use_multiplexed = self.uses_multiplexed(desc);
        let log_id = log_id(desc, use_multiplexed);
        info!("{}", log_id);

        let guard = Guard::new(desc);
        let wire = self.build_wire(desc);
        let raw = guard
            .run(self.send(&wire, desc, use_multiplexed))
            .await
            .map_err(|e| {
                error!("{} Error: status 0 ({})", log_id, e);
                e.with_context(&log_id)
            })?;

        if raw.status == 401 && !desc.is_unauthenticated() && self.is_home_service(&desc.url) {
            warn!("Got 401 from the service, we might be unlinked");
            self.events.publish(DispatchEvent::MightBeUnlinked);
        }

        if raw.status == 0 {
            error!("{} Error: no response", log_id);
            return Err(DispatchError::transport("no response").with_context(&log_id));
        }

        if !is_success(raw.status) {
            error!("{} {} Error", log_id, raw.status);
            let body = match guard.run(raw.body.collect()).await {
                Ok(body) => body,
                Err(DispatchError::Cancelled) => return Err(DispatchError::Cancelled),
                Err(e) => {
                    warn!("{} could not read error body: {}", log_id, e);
                    Bytes::new()
                }
            };
            return Err(DispatchError::HttpStatus {
                status: raw.status,
                headers: raw.headers,
                body,
                context: log_id,
            });
        }

        let status = raw.status;
        let outcome = self.convert(raw, desc, &guard).await.map_err(|e| {
            error!("{} {} Error: {}", log_id, status, e);
            e
        })?;
        info!("{} {} Success", log_id, status);
        Ok(outcome)
    }

    async fn send(
        &self,
        wire: &WireRequest,
        desc: &RequestDescriptor,
        use_multiplexed: bool,
    ) -> Result<RawResponse> {
        if use_multiplexed {
            if let Some(transport) = &self.multiplexed {
                return transport.send(wire).await;
            }
        }
        let class = if desc.is_unauthenticated() {
            AuthClass::Unauth
        } else {
            AuthClass::Auth
        };
        let agent = self.agents.get(desc.proxy_url.as_deref(), class)?;
        self.standalone.send(wire, &agent).await
    }

    fn is_home_service(&self, url: &str) -> bool {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        match (&self.service_host, host) {
            (Some(home), Some(host)) => *home == host,
            _ => false,
        }
    }

    async fn convert(
        &self,
        raw: RawResponse,
        desc: &RequestDescriptor,
        guard: &Guard,
    ) -> Result<Outcome> {
        let content_type = raw.content_type().map(str::to_string);
        let RawResponse {
            status,
            headers,
            body,
        } = raw;

        let data = match desc.shape {
            ResponseShape::Json | ResponseShape::JsonWithDetails => {
                let bytes = guard.run(body.collect()).await?;
                let value = parse_json(&bytes, content_type.as_deref(), status, &headers)?;
                if let Some(schema) = &desc.schema {
                    if let Err(reason) = check_schema(value.as_ref(), schema) {
                        return Err(DispatchError::Validation {
                            status,
                            headers,
                            body: bytes,
                            reason,
                        });
                    }
                }
                if desc.shape == ResponseShape::Json {
                    ResponseData::Json(value)
                } else {
                    ResponseData::JsonWithDetails(WithDetails {
                        data: value,
                        content_type,
                        response: ResponseMeta {
                            status,
                            headers: headers.clone(),
                        },
                    })
                }
            }
            ResponseShape::Bytes => ResponseData::Bytes(guard.run(body.collect()).await?),
            ResponseShape::BytesWithDetails => {
                let bytes = guard.run(body.collect()).await?;
                ResponseData::BytesWithDetails(WithDetails {
                    data: bytes,
                    content_type,
                    response: ResponseMeta {
                        status,
                        headers: headers.clone(),
                    },
                })
            }
            ResponseShape::Stream => {
                let chunks = body.into_stream();
                ResponseData::Stream(match &desc.cancel {
                    Some(token) => cancellable(chunks, token.clone()),
                    None => chunks,
                })
            }
            ResponseShape::Text => {
                let bytes = guard.run(body.collect()).await?;
                ResponseData::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        };

        Ok(Outcome {
            status,
            headers,
            data,
        })
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("user_agent", &self.user_agent)
            .field("service_host", &self.service_host)
            .field("multiplexed", &self.multiplexed.is_some())
            .finish()
    }
}

/// `"{METHOD} ({WS|REST}) {redacted-url}{ (unauth)}"`.
fn log_id(desc: &RequestDescriptor, use_multiplexed: bool) -> String {
    format!(
        "{} ({}) {}{}",
        desc.method,
        if use_multiplexed { "WS" } else { "REST" },
        desc.redactor.apply(&desc.url),
        if desc.is_unauthenticated() {
            " (unauth)"
        } else {
            ""
        }
    )
}

/// Parses a JSON body only when the response declares a JSON content type.
fn parse_json(
    bytes: &Bytes,
    content_type: Option<&str>,
    status: u16,
    headers: &Headers,
) -> Result<Option<Value>> {
    if !is_json_content_type(content_type) || bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| DispatchError::Validation {
            status,
            headers: headers.clone(),
            body: bytes.clone(),
            reason: format!("malformed JSON body: {e}"),
        })
}

/// Deadline and cancellation shared by every step of one attempt.
struct Guard {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<CancellationToken>,
}

impl Guard {
    /// Starts the attempt's clock now.
    fn new(desc: &RequestDescriptor) -> Self {
        Self {
            deadline: desc.timeout.map(|limit| (Instant::now() + limit, limit)),
            cancel: desc.cancel.clone(),
        }
    }

    /// Runs `fut` until it completes, the deadline passes or the token fires.
    async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timed = self.timed(fut);
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DispatchError::Cancelled),
                result = timed => result,
            },
            None => timed.await,
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| DispatchError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => fut.await,
        }
    }
}

/// Ends `chunks` with [`DispatchError::Cancelled`] once `token` fires.
fn cancellable(chunks: ByteStream, token: CancellationToken) -> ByteStream {
    stream::unfold(Some(chunks), move |state| {
        let token = token.clone();
        async move {
            let mut chunks = state?;
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = chunks.next() => Some(item),
            };
            match next {
                None => Some((Err(DispatchError::Cancelled), None)),
                Some(item) => item.map(|chunk| (chunk, Some(chunks))),
            }
        }
    })
    .boxed()
}

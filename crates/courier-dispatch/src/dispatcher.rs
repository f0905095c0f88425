//! Dispatcher: the caller-facing composition of gate, retry and executor.
//!
//! A [`Dispatcher`] owns one logical connection's state: the credential
//! store, the agent cache, the registration gate, and the event bus.
//! Service calls go through [`Dispatcher::call`]; calls to arbitrary URLs
//! (the CDN) go through [`Dispatcher::call_url`], which skips the gate and
//! the multiplexed transport.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentCache, AgentCacheStats, AgentConfig};
use crate::bulk::{BulkConfig, BulkProgress, BulkTransferQueue};
use crate::cdn::{make_put_params, AttachmentUploadForm, PackUploadForms, PutParams};
use crate::config::DispatchConfig;
use crate::constants::{ATTACHMENT_CHUNK_TIMEOUT, DEFAULT_CONTENT_TYPE};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DispatchError, Result};
use crate::events::{DispatchEvent, EventBus};
use crate::executor::RequestExecutor;
use crate::gate::{RegistrationGate, RegistrationToken};
use crate::headers::Headers;
use crate::operation::Operation;
use crate::redact::Redactor;
use crate::request::{AuthMode, Method, RequestDescriptor, ResponseSchema, ResponseShape};
use crate::response::{with_chunk_timeout, ByteStream, Outcome};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::transport::{
    HttpTransport, MultiplexedTransport, SocketStatus, StandaloneTransport, TransportNotice,
};

/// Body of a service call.
#[derive(Debug, Clone)]
pub enum CallBody {
    /// Raw bytes, sent with an explicit length.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Serialized with `serde_json` before sending.
    Json(Value),
}

/// Options for one service call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Logical operation.
    pub operation: Operation,
    /// HTTP method.
    pub method: Method,
    /// Appended to the operation's path.
    pub url_suffix: String,
    /// Overrides the service URL.
    pub host: Option<String>,
    /// Request body.
    pub body: Option<CallBody>,
    /// Defaults to `application/json; charset=utf-8`.
    pub content_type: Option<String>,
    /// Extra headers merged over the defaults.
    pub headers: Headers,
    /// Shape of the successful body.
    pub shape: ResponseShape,
    /// Defaults to the configured request timeout.
    pub timeout: Option<Duration>,
    /// Fields checked on a JSON response.
    pub schema: Option<ResponseSchema>,
    /// Whether the call carries identity.
    pub auth: AuthMode,
    /// Access key for unauthenticated calls.
    pub access_key: Option<String>,
    /// Explicit basic-auth token, already base64.
    pub basic_auth: Option<String>,
    /// Identity/secret used instead of the current credentials.
    pub credentials: Option<Credentials>,
    /// Part of the registration flow; not held back by the gate.
    pub is_registration: bool,
    /// Redacts secrets from logged URLs.
    pub redactor: Redactor,
    /// Aborts the call, including gate waits and backoff.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Authenticated call with a text result and default timeout.
    pub fn new(operation: Operation, method: Method) -> Self {
        Self {
            operation,
            method,
            url_suffix: String::new(),
            host: None,
            body: None,
            content_type: None,
            headers: Headers::new(),
            shape: ResponseShape::default(),
            timeout: None,
            schema: None,
            auth: AuthMode::Authenticated,
            access_key: None,
            basic_auth: None,
            credentials: None,
            is_registration: false,
            redactor: Redactor::Identity,
            cancel: None,
        }
    }

    /// Appends `suffix` to the operation path.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.url_suffix = suffix.into();
        self
    }

    /// Sends to `host` instead of the default base URL.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets a JSON body.
    pub fn with_json(mut self, value: Value) -> Self {
        self.body = Some(CallBody::Json(value));
        self
    }

    /// Sets a raw byte body.
    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(CallBody::Bytes(bytes.into()));
        self
    }

    /// Sets a text body.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(CallBody::Text(text.into()));
        self
    }

    /// Overrides the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the result shape.
    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates JSON responses against `schema`.
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sends without identity, optionally with an access key.
    pub fn unauthenticated(mut self, access_key: Option<String>) -> Self {
        self.auth = AuthMode::Unauthenticated;
        self.access_key = access_key;
        self
    }

    /// Uses an explicit basic-auth token.
    pub fn with_basic_auth(mut self, token: impl Into<String>) -> Self {
        self.basic_auth = Some(token.into());
        self
    }

    /// Uses `credentials` instead of the current ones.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Marks the call as part of the registration flow.
    pub fn registration(mut self) -> Self {
        self.is_registration = true;
        self
    }

    /// Sets the URL redactor for logs.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Device capabilities announced when confirming credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Announcement groups.
    pub announcement_group: bool,
    /// Gift badges.
    pub gift_badges: bool,
    /// Groups v2 revision 3.
    #[serde(rename = "gv2-3")]
    pub gv2_3: bool,
    /// Sender keys.
    pub sender_key: bool,
    /// Number changes.
    pub change_number: bool,
    /// Stories.
    pub stories: bool,
    /// Phone number identity.
    pub pni: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            announcement_group: true,
            gift_badges: true,
            gv2_3: true,
            sender_key: true,
            change_number: true,
            stories: true,
            pni: false,
        }
    }
}

/// Input to [`Dispatcher::confirm_credentials`].
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    /// Phone number being registered.
    pub number: String,
    /// Verification code (or provisioning code when linking a device).
    pub code: String,
    /// Password installed with the new credentials.
    pub new_password: String,
    /// Registration id of the device.
    pub registration_id: u32,
    /// Registration id for the phone number identity.
    pub pni_registration_id: Option<u32>,
    /// Set when linking a secondary device.
    pub device_name: Option<String>,
    /// Raw access key, base64-encoded on the wire.
    pub access_key: Option<Vec<u8>>,
    /// Capabilities to announce.
    pub capabilities: Capabilities,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    capabilities: &'a Capabilities,
    fetches_messages: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    registration_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pni_registration_id: Option<u32>,
    supports_sms: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    unidentified_access_key: Option<String>,
    unrestricted_unidentified_access: bool,
}

/// Server reply to a credential confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResult {
    /// Account id.
    pub uuid: Option<String>,
    /// Phone number identity.
    pub pni: Option<String>,
    /// Device id; `1` when absent.
    pub device_id: Option<u32>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatchConfig,
    credentials: Credentials,
    standalone: Arc<dyn StandaloneTransport>,
    multiplexed: Option<Arc<dyn MultiplexedTransport>>,
    retry: RetryConfig,
    bulk: BulkConfig,
    agent: AgentConfig,
}

impl DispatcherBuilder {
    /// Initial credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replaces the `reqwest` transport.
    pub fn with_standalone(mut self, transport: Arc<dyn StandaloneTransport>) -> Self {
        self.standalone = transport;
        self
    }

    /// Multiplexed transport; ignored unless `use_multiplexed` is set.
    pub fn with_multiplexed(mut self, transport: Arc<dyn MultiplexedTransport>) -> Self {
        self.multiplexed = Some(transport);
        self
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the bulk queue limits.
    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    /// Overrides agent cache settings.
    pub fn with_agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    /// Validates the configuration and assembles the dispatcher.
    ///
    /// With a multiplexed transport this spawns the notice forwarder, so it
    /// must run inside a tokio runtime.
    pub fn build(self) -> Result<Dispatcher> {
        self.config.validate()?;

        let events = EventBus::default();
        let credentials = Arc::new(CredentialStore::new(self.credentials));
        let agents = Arc::new(AgentCache::new(AgentConfig {
            disable_session_resumption: self.config.disable_session_resumption,
            ..self.agent
        }));
        let mut executor = RequestExecutor::new(
            &self.config,
            Arc::clone(&credentials),
            Arc::clone(&agents),
            self.standalone,
            events.clone(),
        );

        let mut forwarder = None;
        if let Some(transport) = self.multiplexed.filter(|_| self.config.use_multiplexed) {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                DispatchError::Config("multiplexed transport requires a tokio runtime".to_string())
            })?;
            forwarder = Some(runtime.spawn(forward_notices(transport.subscribe(), events.clone())));
            executor = executor.with_multiplexed(transport);
        }

        Ok(Dispatcher {
            config: self.config,
            credentials,
            agents,
            executor,
            retry: RetryExecutor::new(self.retry),
            gate: RegistrationGate::new(),
            bulk: BulkTransferQueue::new(self.bulk),
            events,
            forwarder,
        })
    }
}

async fn forward_notices(mut notices: broadcast::Receiver<TransportNotice>, events: EventBus) {
    loop {
        match notices.recv().await {
            Ok(TransportNotice::StatusChange(status)) => {
                events.publish(DispatchEvent::SocketStatusChange(status));
            }
            Ok(TransportNotice::AuthError) => {
                warn!("Multiplexed transport reported an auth error");
                events.publish(DispatchEvent::UnlinkAndDisconnect);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Dropped {} transport notices", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Client-side request dispatcher for the messaging service.
pub struct Dispatcher {
    config: DispatchConfig,
    credentials: Arc<CredentialStore>,
    agents: Arc<AgentCache>,
    executor: RequestExecutor,
    retry: RetryExecutor,
    gate: RegistrationGate,
    bulk: BulkTransferQueue,
    events: EventBus,
    forwarder: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Dispatcher over plain HTTP with the given credentials.
    pub fn new(config: DispatchConfig, credentials: Credentials) -> Result<Self> {
        Self::builder(config).with_credentials(credentials).build()
    }

    /// Starts a builder with empty credentials and the `reqwest` transport.
    pub fn builder(config: DispatchConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            credentials: Credentials::empty(),
            standalone: Arc::new(HttpTransport::new()),
            multiplexed: None,
            retry: RetryConfig::default(),
            bulk: BulkConfig::default(),
            agent: AgentConfig::default(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.snapshot()
    }

    /// Agent cache counters.
    pub fn agent_stats(&self) -> AgentCacheStats {
        self.agents.stats()
    }

    /// Registers an event observer.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Performs a service call.
    ///
    /// Authenticated calls outside the registration flow wait for any open
    /// registration before each attempt, retries included.
    pub async fn call(&self, options: CallOptions) -> Result<Outcome> {
        let desc = self.describe(options)?;
        self.dispatch(&desc, true).await
    }

    /// Performs a call to an arbitrary URL over the standalone transport.
    ///
    /// The configured proxy is used unless the descriptor names one. These
    /// calls bypass the registration gate.
    pub async fn call_url(&self, mut desc: RequestDescriptor) -> Result<Outcome> {
        desc.multiplexable = false;
        if desc.proxy_url.is_none() {
            desc.proxy_url = self.config.proxy_url.clone();
        }
        self.dispatch(&desc, false).await
    }

    async fn dispatch(&self, desc: &RequestDescriptor, gated: bool) -> Result<Outcome> {
        let hold = gated && desc.waits_for_registration();
        self.retry
            .execute(desc.cancel.as_ref(), move || async move {
                if hold {
                    self.wait_for_gate(desc.cancel.as_ref()).await?;
                }
                self.executor.execute(desc).await
            })
            .await
            .into_result()
    }

    async fn wait_for_gate(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let blocked = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(DispatchError::Cancelled),
                blocked = self.gate.wait_idle() => blocked?,
            },
            None => self.gate.wait_idle().await?,
        };
        if let Some(duration) = blocked {
            info!("Request unblocked after {}ms", duration.as_millis());
        }
        Ok(())
    }

    fn describe(&self, options: CallOptions) -> Result<RequestDescriptor> {
        let default_host = if options.operation.is_storage_service() {
            &self.config.storage_url
        } else {
            &self.config.service_url
        };
        let host = options
            .host
            .as_deref()
            .unwrap_or(default_host)
            .trim_end_matches('/');
        let url = format!("{}/{}{}", host, options.operation.path(), options.url_suffix);

        let mut desc = RequestDescriptor::new(options.method, url)
            .with_operation(options.operation)
            .with_headers(options.headers)
            .with_content_type(
                options
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            )
            .with_shape(options.shape)
            .with_timeout(options.timeout.unwrap_or_else(|| self.config.default_timeout()))
            .with_redactor(options.redactor)
            .with_proxy(self.config.proxy_url.clone())
            .multiplexable(options.operation.is_multiplexable());

        desc = match options.body {
            Some(CallBody::Bytes(bytes)) => desc.with_bytes(bytes),
            Some(CallBody::Text(text)) => desc.with_text(text),
            Some(CallBody::Json(value)) => desc.with_text(serde_json::to_string(&value)?),
            None => desc,
        };
        if options.auth == AuthMode::Unauthenticated {
            desc = desc.unauthenticated(options.access_key);
        }
        if let Some(token) = options.basic_auth {
            desc = desc.with_basic_auth(token);
        }
        if let Some(credentials) = options.credentials {
            desc = desc.with_credentials(credentials);
        }
        if let Some(schema) = options.schema {
            desc = desc.with_schema(schema);
        }
        if let Some(cancel) = options.cancel {
            desc = desc.with_cancel(cancel);
        }
        if options.is_registration {
            desc = desc.registration();
        }
        Ok(desc)
    }

    /// Enters the registration window; authenticated calls wait until it ends.
    pub fn start_registration(&self) -> Result<RegistrationToken> {
        self.gate.start()
    }

    /// Leaves the registration window started with `token`.
    pub fn finish_registration(&self, token: &RegistrationToken) -> Result<()> {
        self.gate.finish(token)
    }

    /// Returns `true` while a registration window is open.
    pub fn is_registering(&self) -> bool {
        self.gate.is_active()
    }

    /// Replaces the credentials and re-authenticates the multiplexed transport.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<()> {
        self.credentials.replace(credentials.clone());
        if let Some(transport) = self.executor.multiplexed() {
            transport.authenticate(&credentials).await?;
        }
        Ok(())
    }

    /// Clears the credentials and logs the multiplexed transport out.
    pub async fn logout(&self) -> Result<()> {
        self.credentials.clear();
        if let Some(transport) = self.executor.multiplexed() {
            transport.logout().await?;
        }
        Ok(())
    }

    /// State of the multiplexed transport; `Closed` when none is in use.
    pub fn socket_status(&self) -> SocketStatus {
        self.executor
            .multiplexed()
            .map_or(SocketStatus::Closed, |transport| transport.status())
    }

    /// Forces the multiplexed transport to reconnect.
    pub async fn reconnect(&self) -> Result<()> {
        match self.executor.multiplexed() {
            Some(transport) => transport.reconnect().await,
            None => Ok(()),
        }
    }

    /// Confirms a verification code and installs the resulting credentials.
    ///
    /// Runs as part of the registration flow, so it is not held back by an
    /// open registration window.
    pub async fn confirm_credentials(&self, request: ConfirmRequest) -> Result<ConfirmResult> {
        let body = ConfirmBody {
            capabilities: &request.capabilities,
            fetches_messages: true,
            name: request.device_name.as_deref(),
            registration_id: request.registration_id,
            pni_registration_id: request.pni_registration_id,
            supports_sms: false,
            unidentified_access_key: request.access_key.as_deref().map(|key| STANDARD.encode(key)),
            unrestricted_unidentified_access: false,
        };
        let (operation, suffix) = match request.device_name {
            Some(_) => (Operation::Devices, format!("/{}", request.code)),
            None => (Operation::Accounts, format!("/code/{}", request.code)),
        };

        self.logout().await?;
        self.credentials.replace(Credentials::new(
            request.number.as_str(),
            request.new_password.as_str(),
        ));

        let options = CallOptions::new(operation, Method::Put)
            .with_suffix(suffix)
            .with_json(serde_json::to_value(&body)?)
            .with_shape(ResponseShape::Json)
            .registration();
        let result: ConfirmResult = self
            .call(options)
            .await?
            .into_json()?
            .unwrap_or_default();

        let identity = format!(
            "{}.{}",
            result.uuid.as_deref().unwrap_or(&request.number),
            result.device_id.unwrap_or(1)
        );
        self.credentials
            .replace(Credentials::new(identity, request.new_password.as_str()));
        Ok(result)
    }

    /// Uploads a pack manifest and its parts, returning the pack id.
    ///
    /// Parts go through the bulk queue; `on_progress` fires per completed part.
    pub async fn upload_pack<P>(
        &self,
        manifest: &[u8],
        parts: &[Bytes],
        on_progress: P,
    ) -> Result<String>
    where
        P: FnMut(BulkProgress),
    {
        let outcome = self
            .call(
                CallOptions::new(Operation::GetStickerPackUpload, Method::Get)
                    .with_suffix(format!("/{}", parts.len()))
                    .with_shape(ResponseShape::Json),
            )
            .await?;
        let (status, headers) = (outcome.status, outcome.headers.clone());
        let forms: PackUploadForms = outcome.require_json()?;
        if forms.stickers.len() != parts.len() {
            return Err(DispatchError::Validation {
                status,
                headers,
                body: Bytes::new(),
                reason: format!(
                    "expected {} upload forms, got {}",
                    parts.len(),
                    forms.stickers.len()
                ),
            });
        }

        let cdn = format!("{}/", self.config.cdn_url(None));
        self.post_form(&cdn, make_put_params(&forms.manifest, manifest))
            .await?;

        let jobs: Vec<_> = forms
            .stickers
            .iter()
            .zip(parts)
            .map(|(form, part)| {
                let params = make_put_params(form, part);
                let cdn = cdn.as_str();
                move || self.post_form(cdn, params)
            })
            .collect();
        self.bulk.run(jobs, on_progress).await?;

        Ok(forms.pack_id)
    }

    /// Uploads one attachment, returning its server-assigned id.
    pub async fn put_attachment(&self, data: &[u8]) -> Result<String> {
        let form: AttachmentUploadForm = self
            .call(
                CallOptions::new(Operation::AttachmentId, Method::Get)
                    .with_shape(ResponseShape::Json),
            )
            .await?
            .require_json()?;

        let url = format!("{}/attachments/", self.config.cdn_url(None));
        self.post_form(&url, make_put_params(&form.form, data))
            .await?;
        Ok(form.attachment_id_string)
    }

    /// Streams an attachment from the CDN.
    ///
    /// The stream fails with a timeout, and the transfer is cancelled, when no
    /// chunk arrives for [`ATTACHMENT_CHUNK_TIMEOUT`].
    pub async fn get_attachment(&self, cdn_key: &str, cdn_number: Option<u32>) -> Result<ByteStream> {
        let cancel = CancellationToken::new();
        let url = format!("{}/attachments/{}", self.config.cdn_url(cdn_number), cdn_key);
        let desc = RequestDescriptor::new(Method::Get, url)
            .unauthenticated(None)
            .with_shape(ResponseShape::Stream)
            .without_timeout()
            .with_redactor(Redactor::new([cdn_key]))
            .with_cancel(cancel.clone());

        let outcome = self.call_url(desc).await?;
        let status = outcome.status;
        let headers = outcome.headers.clone();
        let chunks = outcome.into_stream().ok_or_else(|| DispatchError::Validation {
            status,
            headers,
            body: Bytes::new(),
            reason: "expected a streaming body".to_string(),
        })?;

        let name = format!("getAttachment({})", Redactor::new([cdn_key]).apply(cdn_key));
        Ok(with_chunk_timeout(chunks, ATTACHMENT_CHUNK_TIMEOUT)
            .inspect(move |chunk| {
                if let Err(DispatchError::Timeout { .. }) = chunk {
                    warn!("{} timed out waiting for the next chunk", name);
                    cancel.cancel();
                }
            })
            .boxed())
    }

    /// Fetches a third-party URL through the content proxy.
    ///
    /// Never goes out directly: fails with [`DispatchError::Config`] when no
    /// content proxy is configured.
    pub async fn fetch_content(
        &self,
        url: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<Outcome> {
        let proxy = self
            .config
            .content_proxy_url
            .clone()
            .ok_or_else(|| DispatchError::Config("no content proxy configured".to_string()))?;
        let mut desc = RequestDescriptor::new(Method::Get, url)
            .unauthenticated(None)
            .with_shape(ResponseShape::BytesWithDetails)
            .with_redactor(Redactor::whole())
            .with_proxy(Some(proxy));
        if let Some(cancel) = cancel {
            desc = desc.with_cancel(cancel);
        }
        self.call_url(desc).await
    }

    async fn post_form(&self, url: &str, params: PutParams) -> Result<()> {
        let desc = RequestDescriptor::new(Method::Post, url)
            .unauthenticated(None)
            .with_bytes(params.body)
            .with_content_type(params.content_type)
            .without_timeout();
        self.call_url(desc).await.map(|_| ())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("service_url", &self.config.service_url)
            .field("executor", &self.executor)
            .field("gate", &self.gate)
            .finish()
    }
}

//! Request descriptors: everything needed to issue one attempt of a call.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_TIMEOUT;
use crate::credentials::Credentials;
use crate::headers::Headers;
use crate::operation::Operation;
use crate::redact::Redactor;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// HEAD
    Head,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Raw bytes; an explicit `Content-Length` is always sent.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
}

impl Body {
    /// Body as bytes for the wire.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Bytes(bytes) => bytes.clone(),
            Body::Text(text) => Bytes::from(text.clone()),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Body::Bytes(bytes) => bytes.len(),
            Body::Text(text) => text.len(),
        }
    }

    /// Returns `true` for an empty body.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shape the caller wants the successful response body in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// Parsed JSON, or nothing if the response is not declared JSON.
    Json,
    /// Parsed JSON plus content type and response metadata.
    JsonWithDetails,
    /// Raw bytes.
    Bytes,
    /// Raw bytes plus content type and response metadata.
    BytesWithDetails,
    /// Live byte stream.
    Stream,
    /// Body decoded as text.
    #[default]
    Text,
}

/// Whether a request carries the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthMode {
    /// Sends the current or explicit credentials.
    #[default]
    Authenticated,
    /// Sends no credentials; an access key may be attached.
    Unauthenticated,
}

/// Runtime type expected for one field of a JSON response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON `true` or `false`.
    Boolean,
    /// Any object, array or `null`.
    Object,
    /// JSON array only.
    Array,
}

/// Flat field-name to type schema checked against successful JSON responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSchema {
    fields: Vec<(String, FieldType)>,
}

impl ResponseSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push((name.into(), kind));
        self
    }

    /// Declared fields.
    pub fn fields(&self) -> &[(String, FieldType)] {
        &self.fields
    }
}

/// One attempt's worth of request description.
///
/// Built once per logical call and shared by reference across retries, so
/// every attempt sends the same thing.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Logical operation, `None` for calls to arbitrary URLs.
    pub operation: Option<Operation>,
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    /// Caller headers; merged over the defaults.
    pub headers: Headers,
    /// Request body.
    pub body: Option<Body>,
    /// Content type header value.
    pub content_type: Option<String>,
    /// Shape of the successful body.
    pub shape: ResponseShape,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Aborts the call when fired.
    pub cancel: Option<CancellationToken>,
    /// Whether the request carries identity.
    pub auth: AuthMode,
    /// Pre-shared access key, used only when unauthenticated.
    pub access_key: Option<String>,
    /// Explicit basic-auth token (already base64).
    pub basic_auth: Option<String>,
    /// Credentials to use instead of the dispatcher's current ones.
    pub credentials: Option<Credentials>,
    /// Fields checked on a JSON response.
    pub schema: Option<ResponseSchema>,
    /// Redacts secrets from logged URLs.
    pub redactor: Redactor,
    /// Proxy for the standalone transport.
    pub proxy_url: Option<String>,
    /// Allowed to use the multiplexed transport.
    pub multiplexable: bool,
    /// Part of the registration flow; never held by the registration gate.
    pub is_registration: bool,
}

impl RequestDescriptor {
    /// Creates a descriptor with the default timeout and text result shape.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            operation: None,
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            content_type: None,
            shape: ResponseShape::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            cancel: None,
            auth: AuthMode::Authenticated,
            access_key: None,
            basic_auth: None,
            credentials: None,
            schema: None,
            redactor: Redactor::Identity,
            proxy_url: None,
            multiplexable: false,
            is_registration: false,
        }
    }

    /// Tags the descriptor with its operation.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Merges `headers` over the current ones.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.merge(&headers);
        self
    }

    /// Sets a raw byte body.
    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Bytes(bytes.into()));
        self
    }

    /// Sets a text body.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Text(text.into()));
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
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

    /// Removes the timeout; used for large CDN transfers.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Marks the request unauthenticated, optionally with an access key.
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

    /// Validates JSON responses against `schema`.
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets the URL redactor for logs.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Routes standalone calls through `proxy_url`.
    pub fn with_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.proxy_url = proxy_url;
        self
    }

    /// Allows or forbids the multiplexed transport.
    pub fn multiplexable(mut self, multiplexable: bool) -> Self {
        self.multiplexable = multiplexable;
        self
    }

    /// Marks the request as part of the registration flow.
    pub fn registration(mut self) -> Self {
        self.is_registration = true;
        self
    }

    /// Returns `true` for unauthenticated requests.
    pub fn is_unauthenticated(&self) -> bool {
        self.auth == AuthMode::Unauthenticated
    }

    /// Returns `true` if an open registration must hold this request back.
    pub fn waits_for_registration(&self) -> bool {
        !self.is_unauthenticated() && !self.is_registration
    }
}

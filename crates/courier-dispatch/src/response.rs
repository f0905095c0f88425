//! Response classification and result-shape conversion.

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DispatchError, Result};
use crate::headers::Headers;
use crate::request::{FieldType, ResponseSchema};

/// Live response body stream.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Body as handed back by a transport.
pub enum ResponseBody {
    /// Fully read body.
    Buffered(Bytes),
    /// Body still arriving.
    Streaming(ByteStream),
}

impl ResponseBody {
    /// Reads the whole body into memory.
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut chunks) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Turns the body into a stream, wrapping a buffered body as one chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            ResponseBody::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Streaming(chunks) => chunks,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            ResponseBody::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// Status, headers and body received from a transport.
#[derive(Debug)]
pub struct RawResponse {
    /// Received status; `0` means none.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: ResponseBody,
}

impl RawResponse {
    /// Builds a buffered response.
    pub fn buffered(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Status and headers of a successful response, kept for "with details" shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// HTTP status.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
}

/// Converted body plus its declared content type and the response metadata.
#[derive(Debug, Clone)]
pub struct WithDetails<T> {
    /// Converted body.
    pub data: T,
    /// Declared content type.
    pub content_type: Option<String>,
    /// Status and headers.
    pub response: ResponseMeta,
}

/// Successful response body in the shape the caller asked for.
pub enum ResponseData {
    /// `None` when the response was not declared JSON.
    Json(Option<Value>),
    /// Parsed JSON with details.
    JsonWithDetails(WithDetails<Option<Value>>),
    /// Raw bytes.
    Bytes(Bytes),
    /// Raw bytes with details.
    BytesWithDetails(WithDetails<Bytes>),
    /// Live byte stream.
    Stream(ByteStream),
    /// Body decoded as text.
    Text(String),
}

impl fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseData::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ResponseData::JsonWithDetails(d) => f.debug_tuple("JsonWithDetails").field(d).finish(),
            ResponseData::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseData::BytesWithDetails(d) => {
                write!(f, "BytesWithDetails({} bytes, {:?})", d.data.len(), d.content_type)
            }
            ResponseData::Stream(_) => f.write_str("Stream"),
            ResponseData::Text(t) => f.debug_tuple("Text").field(t).finish(),
        }
    }
}

/// A successful, classified response.
#[derive(Debug)]
pub struct Outcome {
    /// HTTP status.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Body in the requested shape.
    pub data: ResponseData,
}

impl Outcome {
    /// Parsed JSON body, if the response carried one.
    pub fn json(&self) -> Option<&Value> {
        match &self.data {
            ResponseData::Json(v) => v.as_ref(),
            ResponseData::JsonWithDetails(d) => d.data.as_ref(),
            _ => None,
        }
    }

    /// Deserializes the JSON body into `T`; `None` when there was no JSON body.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<Option<T>> {
        let value = match self.data {
            ResponseData::Json(v) => v,
            ResponseData::JsonWithDetails(d) => d.data,
            _ => None,
        };
        value
            .map(|v| serde_json::from_value(v).map_err(DispatchError::from))
            .transpose()
    }

    /// Deserializes a required JSON body into `T`.
    pub fn require_json<T: DeserializeOwned>(self) -> Result<T> {
        let status = self.status;
        let headers = self.headers.clone();
        self.into_json()?.ok_or_else(|| DispatchError::Validation {
            status,
            headers,
            body: Bytes::new(),
            reason: "expected a JSON body".to_string(),
        })
    }

    /// Raw body bytes for byte shapes.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self.data {
            ResponseData::Bytes(b) => Some(b),
            ResponseData::BytesWithDetails(d) => Some(d.data),
            _ => None,
        }
    }

    /// Body stream for the stream shape.
    pub fn into_stream(self) -> Option<ByteStream> {
        match self.data {
            ResponseData::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Text body for the text shape.
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            ResponseData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Returns `true` for a received status below 400.
///
/// `0` is reserved for "no response" and is never a success.
pub fn is_success(status: u16) -> bool {
    (1..400).contains(&status)
}

/// Returns `true` for `application/json` with optional parameters.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ct == "application/json" || ct.starts_with("application/json;"),
        None => false,
    }
}

/// Checks every declared field's runtime type, returning the first mismatch.
pub fn check_schema(value: Option<&Value>, schema: &ResponseSchema) -> std::result::Result<(), String> {
    let object = match value.and_then(Value::as_object) {
        Some(object) => object,
        None => return Err("response is not a JSON object".to_string()),
    };
    for (name, kind) in schema.fields() {
        let field = object.get(name);
        let ok = match (kind, field) {
            (FieldType::String, Some(Value::String(_))) => true,
            (FieldType::Number, Some(Value::Number(_))) => true,
            (FieldType::Boolean, Some(Value::Bool(_))) => true,
            (FieldType::Object, Some(Value::Object(_) | Value::Array(_) | Value::Null)) => true,
            (FieldType::Array, Some(Value::Array(_))) => true,
            _ => false,
        };
        if !ok {
            return Err(format!("field `{name}` is not {kind:?}"));
        }
    }
    Ok(())
}

/// Wraps `chunks` so that a gap longer than `timeout` between chunks ends the
/// stream with a timeout error, dropping (and so cancelling) the source.
pub fn with_chunk_timeout(chunks: ByteStream, timeout: Duration) -> ByteStream {
    let timeout_ms = timeout.as_millis() as u64;
    stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout(timeout, chunks.next()).await {
            Ok(Some(item)) => Some((item, Some(chunks))),
            Ok(None) => None,
            Err(_) => Some((Err(DispatchError::Timeout { timeout_ms }), None)),
        }
    })
    .boxed()
}

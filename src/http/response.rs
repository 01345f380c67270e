//! Response descriptors and the response writer
//!
//! Handlers and middleware describe a response with [`Reply`]. The
//! [`ResponseHandle`] owned by each request accepts at most one reply, and
//! [`render`] turns that reply into the hyper response sent on the wire.

use crate::error::DispatchError;
use futures::stream::BoxStream;
use futures::{Stream, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, SERVER};
use hyper::{HeaderMap, Response, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

pub const JSON_CONTENT_TYPE: &str = "application/json";
const OCTET_STREAM: &str = "application/octet-stream";

/// Body type handed to the transport
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Chunked body produced by a handler
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Payload of a [`Reply`]
pub enum Message {
    /// Structured value, serialized as JSON unless a non-JSON type is set
    Json(Value),
    Text(String),
    Bytes(Bytes),
    /// Piped to the connection as it is produced
    Stream(ByteStream),
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// Response descriptor: status code, optional headers and a message
#[derive(Debug)]
pub struct Reply {
    pub code: u16,
    pub message: Message,
    pub headers: HashMap<String, String>,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<Message>) -> Self {
        Self {
            code,
            message: message.into(),
            headers: HashMap::new(),
        }
    }

    pub fn json(code: u16, value: Value) -> Self {
        Self::new(code, Message::Json(value))
    }

    pub fn text(code: u16, text: impl Into<String>) -> Self {
        Self::new(code, Message::Text(text.into()))
    }

    pub fn bytes(code: u16, bytes: impl Into<Bytes>) -> Self {
        Self::new(code, Message::Bytes(bytes.into()))
    }

    pub fn stream<S>(code: u16, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::new(code, Message::Stream(Box::pin(stream)))
    }

    /// Add or replace a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Fixed-format error reply: `{"error": "<description>"}`
    pub fn from_error(err: &DispatchError) -> Self {
        Self::json(
            err.status().as_u16(),
            serde_json::json!({ "error": err.to_string() }),
        )
    }

    fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct Slot {
    written: bool,
    reply: Option<Reply>,
}

/// Write-once response slot shared by everything handling one request
///
/// Clones refer to the same slot.
#[derive(Clone, Default)]
pub struct ResponseHandle {
    slot: Arc<Mutex<Slot>>,
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("written", &self.is_written())
            .finish()
    }
}

impl ResponseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the response. Fails on every call after the first; the
    /// reply that was written first is kept.
    pub fn write(&self, reply: Reply) -> Result<(), DispatchError> {
        let mut slot = self.slot.lock();
        if slot.written {
            tracing::error!(code = reply.code, "response written twice; second reply dropped");
            return Err(DispatchError::ResponseAlreadyWritten);
        }
        slot.written = true;
        slot.reply = Some(reply);
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        self.slot.lock().written
    }

    /// Remove the written reply for sending. The slot stays marked as written.
    pub(crate) fn take(&self) -> Option<Reply> {
        self.slot.lock().reply.take()
    }
}

/// Render a reply into a hyper response
///
/// Headers from the reply override the defaults (`Content-Type`, `Server`).
/// With a JSON content type only `message` is serialized. A reply carrying a
/// header that cannot go on the wire is replaced by a JSON error response.
pub fn render(reply: Reply, server_name: &str) -> Response<ResponseBody> {
    let status = StatusCode::from_u16(reply.code).unwrap_or_else(|_| {
        tracing::error!(code = reply.code, "invalid status code in reply");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let content_type = reply
        .content_type()
        .unwrap_or(match reply.message {
            Message::Json(_) | Message::Text(_) => JSON_CONTENT_TYPE,
            Message::Bytes(_) | Message::Stream(_) => OCTET_STREAM,
        })
        .to_string();
    let is_json = is_json_type(&content_type);

    let headers = match response_headers(&content_type, server_name, &reply.headers) {
        Ok(headers) => headers,
        Err(err) => {
            tracing::error!(error = %err, "reply rejected");
            return render_error(&err, server_name);
        }
    };

    let body = match reply.message {
        Message::Json(value) => full(if is_json {
            serde_json::to_vec(&value).unwrap_or_default()
        } else {
            match value {
                Value::String(s) => s.into_bytes(),
                other => other.to_string().into_bytes(),
            }
        }),
        Message::Text(text) => full(if is_json {
            serde_json::to_vec(&Value::String(text)).unwrap_or_default()
        } else {
            text.into_bytes()
        }),
        Message::Bytes(bytes) => full(bytes),
        Message::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Defaults first, then the reply's own headers on top
fn response_headers(
    content_type: &str,
    server_name: &str,
    extra: &HashMap<String, String>,
) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "content-type", content_type)?;
    insert_header(&mut headers, "server", server_name)?;
    for (name, value) in extra {
        insert_header(&mut headers, name, value)?;
    }
    Ok(headers)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), DispatchError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| DispatchError::handler(format!("Invalid response header name: {name:?}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| DispatchError::handler(format!("Invalid value for response header {name}")))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// JSON error response that cannot itself fail to build
fn render_error(err: &DispatchError, server_name: &str) -> Response<ResponseBody> {
    let body = serde_json::to_vec(&serde_json::json!({ "error": err.to_string() })).unwrap_or_default();
    let mut response = Response::new(full(body));
    *response.status_mut() = err.status();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    if let Ok(server) = HeaderValue::from_str(server_name) {
        headers.insert(SERVER, server);
    }
    response
}

/// `application/json`, `application/problem+json`, with or without parameters
pub fn is_json_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == JSON_CONTENT_TYPE || essence.ends_with("+json")
}

fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

//! Incoming HTTP request type and its request-scoped context.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderMap, Uri};
use serde::de::DeserializeOwned;

use crate::json::{self, JsonError};

/// Correlation identifier attached to one request.
///
/// Written once by [`SetRequestId`](crate::middleware::SetRequestId) before
/// any downstream stage runs; everyone else reads it through
/// [`Request::request_id`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestId(String);

impl RequestId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An incoming HTTP request with its body fully read.
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) request_id: Option<RequestId>,
    /// The body could not be read off the wire; the endpoint answers 400.
    pub(crate) unreadable_body: bool,
}

impl Request {
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: None,
            request_id: None,
            unreadable_body: false,
        }
    }

    /// A request whose body failed to arrive. It still runs through the
    /// whole pipeline so every middleware sees it.
    pub(crate) fn with_unreadable_body(parts: http::request::Parts) -> Self {
        let mut req = Self::from_parts(parts, Bytes::new());
        req.unreadable_body = true;
        req
    }

    /// Records the peer address. The server sets this for every connection.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `GET /users/{id}`, `req.param("id")` on `/users/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The correlation ID, once [`SetRequestId`](crate::middleware::SetRequestId)
    /// has run.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// First writer wins; the ID never changes once assigned.
    pub(crate) fn set_request_id(&mut self, id: RequestId) -> &RequestId {
        self.request_id.get_or_insert(id)
    }

    /// Decodes the body as a single JSON value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, JsonError> {
        json::decode(&self.body)
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

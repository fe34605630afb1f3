//! Correlation IDs.
//!
//! Every request leaves this middleware with a [`RequestId`] in its context
//! and an `X-Request-Id` on its response. A trusted proxy may supply its own
//! ID; anything blank or longer than 128 bytes is replaced so untrusted
//! clients cannot inject arbitrary text into the logs.

use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use rand::TryRngCore;
use rand::rngs::OsRng;

use super::Middleware;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::{Request, RequestId};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_INBOUND_LEN: usize = 128;
const ID_BYTES: usize = 16;

/// Entropy for generated IDs.
pub trait RandomSource: Send + Sync + 'static {
    fn fill(&self, buf: &mut [u8]) -> Result<(), Error>;
}

/// The operating system's secure random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), Error> {
        OsRng.try_fill_bytes(buf).map_err(|e| Error::Entropy(e.to_string()))
    }
}

/// Assigns or propagates `X-Request-Id`.
pub struct SetRequestId {
    source: Arc<dyn RandomSource>,
}

impl SetRequestId {
    pub fn new() -> Self {
        Self::with_source(OsRandom)
    }

    pub fn with_source(source: impl RandomSource) -> Self {
        Self { source: Arc::new(source) }
    }
}

impl Default for SetRequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for SetRequestId {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(SetRequestIdHandler { source: Arc::clone(&self.source), next })
    }
}

struct SetRequestIdHandler {
    source: Arc<dyn RandomSource>,
    next: BoxedHandler,
}

impl ErasedHandler for SetRequestIdHandler {
    fn call(&self, mut req: Request) -> BoxFuture {
        let candidate = match req.header(X_REQUEST_ID.as_str()) {
            Some(inbound) if acceptable(inbound) => inbound.to_owned(),
            _ => generate(&*self.source),
        };
        let id = req.set_request_id(RequestId::new(candidate));
        // Inbound values were valid header values and generated ones are hex.
        let value = HeaderValue::from_str(id.as_str()).ok();

        let next = Arc::clone(&self.next);
        Box::pin(async move {
            let mut res = next.call(req).await;
            if let Some(value) = value {
                res.headers_mut().entry(X_REQUEST_ID).or_insert(value);
            }
            res
        })
    }
}

fn acceptable(inbound: &str) -> bool {
    !inbound.trim().is_empty() && inbound.len() <= MAX_INBOUND_LEN
}

/// 16 random bytes as 32 lowercase hex characters.
///
/// Without entropy the current Unix time in nanoseconds (hex) is used
/// instead; unique in practice but guessable.
fn generate(source: &dyn RandomSource) -> String {
    let mut buf = [0u8; ID_BYTES];
    match source.fill(&mut buf) {
        Ok(()) => hex::encode(buf),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to timestamp request id");
            format!("{:x}", jiff::Timestamp::now().as_nanosecond())
        }
    }
}

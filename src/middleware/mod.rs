//! Middleware layer.
//!
//! A middleware turns the next handler into a new handler. Registered on a
//! [`Router`](crate::Router) in the order `[A, B, C]`, the effective pipeline
//! is `A(B(C(endpoint)))`: `A` sees the request first and the response last.
//!
//! Built-in middleware, in the order they are meant to be registered:
//!
//! | Middleware | Job |
//! |---|---|
//! | [`SetRequestId`] | assign or propagate `X-Request-Id` |
//! | [`AccessLog`] | one structured record per request |
//! | [`Cors`] | cross-origin policy and preflight answers |
//! | [`Recover`] | turn handler panics into a logged 500 |
//!
//! `SetRequestId` goes first so every later stage can read the ID. `AccessLog`
//! sits outside `Recover` so it records the substituted 500, and `Recover`
//! goes last so it sits directly around the route handlers.
//!
//! Write your own with [`from_fn`]:
//!
//! ```rust
//! use weft::{Request, Router, middleware::{self, Next}};
//!
//! let app = Router::new().with(middleware::from_fn(|req: Request, next: Next| async move {
//!     let mut res = next.call(req).await;
//!     res.headers_mut().insert("x-powered-by", http::HeaderValue::from_static("weft"));
//!     res
//! }));
//! ```

mod access_log;
mod cors;
mod recover;
mod record;
mod request_id;
mod sink;

use std::future::Future;
use std::sync::Arc;

pub use crate::handler::Next;
pub use access_log::AccessLog;
pub use cors::{Cors, CorsConfig};
pub use record::{AccessRecord, FaultRecord, Level};
pub use recover::Recover;
pub use request_id::{OsRandom, RandomSource, SetRequestId, X_REQUEST_ID};
pub use sink::{JsonLines, LogSink, TracingSink};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::IntoResponse;

/// A handler transformer.
///
/// `wrap` is called once per middleware when the router composes its
/// pipeline, not once per request.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// Builds a middleware from an async closure taking the request and the next
/// stage.
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(Arc::new(f))
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F>(Arc<F>);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(FromFnHandler { f: Arc::clone(&self.0), next })
    }
}

struct FromFnHandler<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut, R> ErasedHandler for FromFnHandler<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.f)(req, Arc::clone(&self.next));
        Box::pin(async move { fut.await.into_response() })
    }
}

//! # weft
//!
//! A minimal HTTP request-dispatch layer: a radix-tree router plus an ordered
//! chain of cross-cutting middleware, served over hyper.
//!
//! ## The contract
//!
//! The router maps `"<METHOD> <path>"` patterns to handlers. Middleware wrap
//! the whole route table: registered as `[A, B, C]`, the pipeline is
//! `A(B(C(routes)))`, so `A` sees every request first and every response last,
//! including 404s, 405s and recovered panics.
//!
//! What ships in the box:
//!
//! - Radix-tree routing via [`matchit`], one tree per method
//! - [`middleware::SetRequestId`] — `X-Request-Id` correlation
//! - [`middleware::AccessLog`] — one JSON line per request
//! - [`middleware::Cors`] — origin policy and preflight answers
//! - [`middleware::Recover`] — panics become a logged `500`
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! TLS, timeouts and body limits belong to the reverse proxy in front.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use weft::middleware::{AccessLog, Recover, SetRequestId};
//! use weft::{Json, Request, Router, Server, health};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .with(SetRequestId::new())
//!         .with(AccessLog::new())
//!         .with(Recover::new())
//!         .get("/healthz",    health::liveness)
//!         .get("/users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:8080").serve(app).await.unwrap();
//! }
//!
//! #[derive(serde::Serialize)]
//! struct User { id: String }
//!
//! async fn get_user(req: Request) -> (StatusCode, Json<User>) {
//!     let id = req.param("id").unwrap_or_default().to_owned();
//!     (StatusCode::OK, Json(User { id }))
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod json;
pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use json::Json;
pub use method::Method;
pub use request::{Request, RequestId};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;

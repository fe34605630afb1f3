//! Structured access log: one [`AccessRecord`] per completed request.

use std::sync::Arc;
use std::time::Instant;

use super::Middleware;
use super::record::{self, AccessRecord, Level};
use super::sink::{JsonLines, LogSink};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

/// Records status, size and latency of every request.
///
/// Register it after [`SetRequestId`](super::SetRequestId) so the record
/// carries the correlation ID, and before [`Recover`](super::Recover) so a
/// caught panic is logged with its 500.
pub struct AccessLog {
    sink: Arc<dyn LogSink>,
}

impl AccessLog {
    /// Logs JSON lines to stdout.
    pub fn new() -> Self {
        Self::with_sink(JsonLines::stdout())
    }

    pub fn with_sink(sink: impl LogSink) -> Self {
        Self { sink: Arc::new(sink) }
    }

    pub fn with_shared_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl Default for AccessLog {
    fn default() -> Self { Self::new() }
}

impl Middleware for AccessLog {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AccessLogHandler { sink: Arc::clone(&self.sink), next })
    }
}

struct AccessLogHandler {
    sink: Arc<dyn LogSink>,
    next: BoxedHandler,
}

/// What the request looked like on the way in.
struct Inbound {
    request_id: String,
    method: String,
    path: String,
    remote_ip: String,
    user_agent: String,
    /// The server drops the body of a `HEAD` response.
    head: bool,
}

impl Inbound {
    fn of(req: &Request) -> Self {
        Self {
            request_id: req.request_id().map(ToString::to_string).unwrap_or_default(),
            method: req.method().to_string(),
            path: req.path().to_owned(),
            remote_ip: req.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
            user_agent: req.user_agent().unwrap_or_default().to_owned(),
            head: req.method() == http::Method::HEAD,
        }
    }

    fn complete(self, res: &Response, started: Instant) -> AccessRecord {
        AccessRecord {
            ts: record::now(),
            level: Level::Info,
            request_id: self.request_id,
            method: self.method,
            path: self.path,
            status: res.status_code().as_u16(),
            bytes: if self.head { 0 } else { res.body().len() },
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            remote_ip: self.remote_ip,
            user_agent: self.user_agent,
        }
    }
}

impl ErasedHandler for AccessLogHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let started = Instant::now();
        let inbound = Inbound::of(&req);
        let sink = Arc::clone(&self.sink);
        let fut = self.next.call(req);

        Box::pin(async move {
            let res = fut.await;
            sink.access(&inbound.complete(&res, started));
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::middleware::SetRequestId;
    use crate::middleware::testing::{FixedRandom, MemorySink, build, request};
    use crate::Router;

    fn app(sink: Arc<MemorySink>) -> BoxedHandler {
        Router::new()
            .with(SetRequestId::with_source(FixedRandom(0x0f)))
            .with(AccessLog::with_shared_sink(sink))
            .post("/notes", |_req: Request| async { (StatusCode::CREATED, "0123456789") })
            .get("/healthz", |_req: Request| async { "ok" })
            .into_handler()
    }

    #[tokio::test]
    async fn records_handler_status_and_bytes() {
        let sink = Arc::new(MemorySink::default());
        let app = app(Arc::clone(&sink));

        let req = request("POST", "/notes")
            .header("user-agent", "curl/8.5")
            .body(Bytes::new())
            .unwrap();
        let remote: SocketAddr = "10.0.0.7:55123".parse().unwrap();
        let res = app.call(Request::from(req).with_remote_addr(remote)).await;

        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), b"0123456789");

        let records = sink.access.lock().unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.status, 201);
        assert_eq!(r.bytes, 10);
        assert_eq!(r.level, Level::Info);
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/notes");
        assert_eq!(r.request_id, "0f".repeat(16));
        assert_eq!(r.remote_ip, "10.0.0.7");
        assert_eq!(r.user_agent, "curl/8.5");
        assert!(r.ts.parse::<jiff::Timestamp>().is_ok(), "ts {}", r.ts);
    }

    #[tokio::test]
    async fn defaults_to_200_and_logs_misses() {
        let sink = Arc::new(MemorySink::default());
        let app = app(Arc::clone(&sink));

        app.call(build(request("GET", "/healthz"))).await;
        app.call(build(request("GET", "/missing"))).await;

        let records = sink.access.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].status, records[0].bytes), (200, 2));
        assert_eq!(records[1].status, 404);
        assert_eq!(records[1].remote_ip, "");
    }

    #[tokio::test]
    async fn head_on_get_route_logs_no_bytes() {
        let sink = Arc::new(MemorySink::default());
        let app = app(Arc::clone(&sink));

        let res = app.call(build(request("HEAD", "/healthz"))).await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let records = sink.access.lock().unwrap();
        assert_eq!(records[0].method, "HEAD");
        assert_eq!((records[0].status, records[0].bytes), (200, 0));
    }

    #[tokio::test]
    async fn does_not_alter_the_response() {
        let sink = Arc::new(MemorySink::default());
        let plain = Router::new()
            .post("/notes", |_req: Request| async { (StatusCode::CREATED, "0123456789") })
            .into_handler();

        let logged = app(sink).call(build(request("POST", "/notes"))).await;
        let bare = plain.call(build(request("POST", "/notes"))).await;

        assert_eq!(logged.status_code(), bare.status_code());
        assert_eq!(logged.body(), bare.body());
        assert_eq!(logged.headers()["content-type"], bare.headers()["content-type"]);
    }
}

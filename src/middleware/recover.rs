//! Panic recovery.
//!
//! A panic inside a handler would otherwise tear down the connection task
//! and leave the client without an answer. [`Recover`] catches it, writes a
//! [`FaultRecord`] and answers `500` with a fixed JSON body.
//!
//! Responses are buffered values, so when the panic is caught nothing has
//! been written to the client yet and the substitute always goes out intact.
//!
//! By the time `catch_unwind` returns the stack has already unwound, so the
//! backtrace is taken earlier: the first [`Recover`] to be composed chains a
//! process-wide panic hook that stores the panicking thread's backtrace in a
//! thread-local before handing over to the previous hook. If the application
//! replaces the hook afterwards, the record falls back to the catch site.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use futures::FutureExt;
use http::StatusCode;

use super::Middleware;
use super::record::{self, FaultRecord, Level};
use super::sink::{JsonLines, LogSink};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::json;
use crate::request::Request;
use crate::response::Response;

const FAULT_BODY: &[u8] = br#"{"error":"internal_server_error"}"#;

thread_local! {
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static STACK_HOOK: Once = Once::new();

fn install_stack_hook() {
    STACK_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// The backtrace recorded by the hook for this thread's latest panic.
fn take_stack() -> String {
    PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Fault boundary around everything registered after it.
///
/// Register it last so it sits directly around the route handlers, with
/// [`SetRequestId`](super::SetRequestId) and [`AccessLog`](super::AccessLog)
/// outside it.
pub struct Recover {
    sink: Arc<dyn LogSink>,
}

impl Recover {
    /// Logs fault records as JSON lines to stdout.
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

impl Default for Recover {
    fn default() -> Self { Self::new() }
}

impl Middleware for Recover {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        install_stack_hook();
        Arc::new(RecoverHandler { sink: Arc::clone(&self.sink), next })
    }
}

struct RecoverHandler {
    sink: Arc<dyn LogSink>,
    next: BoxedHandler,
}

impl ErasedHandler for RecoverHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let request_id = req.request_id().map(ToString::to_string).unwrap_or_default();
        let method = req.method().to_string();
        let path = req.path().to_owned();
        let sink = Arc::clone(&self.sink);
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            // `next.call` runs inside the boundary too: some handlers panic
            // before returning their future.
            let guarded = AssertUnwindSafe(async move { next.call(req).await }).catch_unwind();
            match guarded.await {
                Ok(res) => res,
                Err(payload) => {
                    sink.fault(&FaultRecord {
                        ts: record::now(),
                        level: Level::Error,
                        request_id,
                        panic: panic_message(payload.as_ref()),
                        stack: take_stack(),
                        method,
                        path,
                    });
                    fault_response()
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn fault_response() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .bytes(json::CONTENT_TYPE, FAULT_BODY)
}

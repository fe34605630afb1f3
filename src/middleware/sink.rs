//! Where access and fault records go.
//!
//! Middleware take an `Arc<dyn LogSink>` at construction so tests (and
//! applications with their own pipeline) can swap the destination. Writing
//! is fire-and-forget: a failing sink never affects the response.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::record::{AccessRecord, FaultRecord};

pub trait LogSink: Send + Sync + 'static {
    fn access(&self, record: &AccessRecord);
    fn fault(&self, record: &FaultRecord);
}

/// Writes each record as one JSON object per line.
///
/// The default sink for [`AccessLog`](super::AccessLog) and
/// [`Recover`](super::Recover) is `JsonLines::stdout()`.
pub struct JsonLines<W> {
    out: Mutex<W>,
}

impl JsonLines<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn line<T: Serialize>(&self, record: &T) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write_line(&mut *out, record) {
            tracing::debug!(error = %e, "dropping log record");
        }
    }
}

fn write_line<W: Write, T: Serialize>(out: &mut W, record: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")?;
    out.flush()
}

impl<W: Write + Send + 'static> LogSink for JsonLines<W> {
    fn access(&self, record: &AccessRecord) {
        self.line(record);
    }

    fn fault(&self, record: &FaultRecord) {
        self.line(record);
    }
}

/// Forwards records as `tracing` events, for applications that already
/// route everything through a subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn access(&self, r: &AccessRecord) {
        tracing::info!(
            target: "weft::access",
            ts = %r.ts,
            request_id = %r.request_id,
            method = %r.method,
            path = %r.path,
            status = r.status,
            bytes = r.bytes,
            latency_ms = r.latency_ms,
            remote_ip = %r.remote_ip,
            user_agent = %r.user_agent,
            "request completed"
        );
    }

    fn fault(&self, r: &FaultRecord) {
        tracing::error!(
            target: "weft::fault",
            ts = %r.ts,
            request_id = %r.request_id,
            panic = %r.panic,
            method = %r.method,
            path = %r.path,
            stack = %r.stack,
            "handler panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::middleware::Level;

    /// Collects formatted `tracing` output.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn sample() -> AccessRecord {
        AccessRecord {
            ts: "2026-01-01T00:00:00.000000001Z".into(),
            level: Level::Info,
            request_id: "abc".into(),
            method: "GET".into(),
            path: "/healthz".into(),
            status: 200,
            bytes: 12,
            latency_ms: 0,
            remote_ip: "127.0.0.1".into(),
            user_agent: "curl/8".into(),
        }
    }

    #[test]
    fn writes_one_json_object_per_line() {
        let sink = JsonLines::new(Vec::new());
        sink.access(&sample());
        sink.access(&sample());

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["status"], 200);
        assert_eq!(value["bytes"], 12);
        assert_eq!(value["request_id"], "abc");
    }

    #[test]
    fn tracing_sink_emits_events_under_weft_targets() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.access(&sample());
            TracingSink.fault(&FaultRecord {
                ts: "2026-01-01T00:00:01Z".into(),
                level: Level::Error,
                request_id: "abc".into(),
                panic: "boom".into(),
                stack: "frames".into(),
                method: "GET".into(),
                path: "/panic".into(),
            });
        });

        let out = captured.text();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2, "{out}");

        assert!(lines[0].contains("INFO"), "{out}");
        assert!(lines[0].contains("weft::access"), "{out}");
        assert!(lines[0].contains("ts=2026-01-01T00:00:00.000000001Z"), "{out}");
        assert!(lines[0].contains("status=200"), "{out}");

        assert!(lines[1].contains("ERROR"), "{out}");
        assert!(lines[1].contains("weft::fault"), "{out}");
        assert!(lines[1].contains("panic=boom"), "{out}");
        assert!(lines[1].contains("request_id=abc"), "{out}");
    }
}

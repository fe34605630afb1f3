//! Structured records emitted by the logging and recovery middleware.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

/// One line per completed request.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AccessRecord {
    /// RFC 3339, nanosecond precision.
    pub ts: String,
    pub level: Level,
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub bytes: usize,
    pub latency_ms: u64,
    pub remote_ip: String,
    pub user_agent: String,
}

/// Emitted only when [`Recover`](super::Recover) catches a panic.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FaultRecord {
    pub ts: String,
    pub level: Level,
    pub request_id: String,
    pub panic: String,
    pub stack: String,
    pub method: String,
    pub path: String,
}

pub(crate) fn now() -> String {
    jiff::Timestamp::now().to_string()
}

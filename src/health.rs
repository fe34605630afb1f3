//! Built-in health-check handlers.
//!
//! | Probe | Path | Body |
//! |---|---|---|
//! | **Liveness** | `/healthz` | `{"ok":true}` |
//! | **Readiness** | `/readyz` | `{"ready":true}` |
//!
//! ```rust,no_run
//! use weft::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler if the service must warm up or
//! check dependencies before taking traffic.

use serde::Serialize;

use crate::json::Json;
use crate::request::Request;

#[derive(Serialize)]
pub struct Liveness {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct Readiness {
    pub ready: bool,
}

/// Always `200 OK` with `{"ok":true}`: if the process answers HTTP at all,
/// it is alive.
pub async fn liveness(_req: Request) -> Json<Liveness> {
    Json(Liveness { ok: true })
}

pub async fn readiness(_req: Request) -> Json<Readiness> {
    Json(Readiness { ready: true })
}

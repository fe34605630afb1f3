//! Minimal weft service: health check, a JSON resource, and a panic route to
//! watch the recovery middleware at work.
//!
//! Run with:
//!   RUST_LOG=weft=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:8080/healthz
//!   curl -i http://localhost:8080/notes/42
//!   curl -i -X PUT http://localhost:8080/notes/42 -d '{"title":"hi"}'
//!   curl -i http://localhost:8080/panic
//!   curl -i -X OPTIONS http://localhost:8080/notes/1 \
//!        -H 'origin: http://localhost:5173' \
//!        -H 'access-control-request-method: PUT'
//!
//! Environment:
//!   WEFT_ADDR          listen address (default 0.0.0.0:8080)
//!   WEFT_CORS_ORIGINS  comma-separated allowed origins; CORS is off when unset
//!   WEFT_LOG_SINK      `tracing` sends access and fault records through the
//!                      subscriber instead of JSON lines on stdout

use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use weft::middleware::{
    AccessLog, Cors, CorsConfig, JsonLines, LogSink, Recover, SetRequestId, TracingSink,
};
use weft::{Json, Request, Response, Router, Server, health, json};

#[tokio::main]
async fn main() -> Result<(), weft::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::var("WEFT_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let sink: Arc<dyn LogSink> = match std::env::var("WEFT_LOG_SINK").as_deref() {
        Ok("tracing") => Arc::new(TracingSink),
        _ => Arc::new(JsonLines::stdout()),
    };

    let mut app = Router::new()
        .with(SetRequestId::new())
        .with(AccessLog::with_shared_sink(Arc::clone(&sink)));

    if let Ok(origins) = std::env::var("WEFT_CORS_ORIGINS") {
        let config = CorsConfig::default()
            .allow_origins(origins.split(',').map(str::trim).filter(|o| !o.is_empty()))
            .allow_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allow_credentials(true)
            .max_age(600);
        app = app.with(Cors::new(config)?);
    }

    let app = app
        .with(Recover::with_shared_sink(sink))
        .get("/healthz",    health::liveness)
        .get("/readyz",     health::readiness)
        .get("/notes/{id}", get_note)
        .put("/notes/{id}", put_note)
        .get("/panic",      explode);

    Server::try_bind(&addr)?.serve(app).await
}

#[derive(Deserialize, Serialize)]
struct Note {
    id: String,
    title: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoteInput {
    title: String,
}

// GET /notes/{id}
async fn get_note(req: Request) -> Json<Note> {
    let id = req.param("id").unwrap_or_default().to_owned();
    Json(Note { id, title: "untitled".to_owned() })
}

// PUT /notes/{id} → 400 with the decode error, or 200 with the stored note
async fn put_note(req: Request) -> Response {
    use weft::IntoResponse;

    let input: NoteInput = match req.json() {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };
    if input.title.trim().is_empty() {
        return json::error(StatusCode::UNPROCESSABLE_ENTITY, "title must not be blank");
    }

    let id = req.param("id").unwrap_or_default().to_owned();
    Json(Note { id, title: input.title }).into_response()
}

// GET /panic → 500 {"error":"internal_server_error"} plus a fault record
async fn explode(_req: Request) -> Response {
    panic!("AAAAAHHH, BEEESSS")
}

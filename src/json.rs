//! JSON bodies in and out.
//!
//! [`Json`] turns any serde value into a response; [`decode`] (and
//! [`Request::json`](crate::Request::json)) turns a request body into one.
//! Encoding failures never escape as a hung connection: they become a 500
//! with a fixed body and an error event at the call site.

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

use crate::response::{IntoResponse, Response};

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

const ENCODING_FAILED: &[u8] = br#"{"error":"encoding_failed"}"#;

/// A serde value rendered as an `application/json` response.
///
/// ```rust
/// use http::StatusCode;
/// use weft::{IntoResponse, Json};
///
/// #[derive(serde::Serialize)]
/// struct User { id: u64 }
///
/// let res = (StatusCode::CREATED, Json(User { id: 7 })).into_response();
/// assert_eq!(res.body(), b"{\"id\":7}\n");
/// ```
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(mut body) => {
                body.push(b'\n');
                Response::json(body)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode json response");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(ENCODING_FAILED)
            }
        }
    }
}

/// The `{"error": "..."}` body used for error responses.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Builds a JSON error response: `{"error": message}` with `status`.
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

/// Why a request body could not be decoded.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("request body must not be empty")]
    Empty,

    #[error("malformed JSON at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    /// Well-formed JSON that does not fit the target type (wrong field type,
    /// missing field, unknown field under `deny_unknown_fields`).
    #[error("invalid value: {0}")]
    Data(String),

    #[error("body must contain only a single JSON value")]
    Trailing,
}

/// A decode failure is the client's fault: `400` with the reason.
impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        error(StatusCode::BAD_REQUEST, self.to_string())
    }
}

/// Decodes exactly one JSON value from `body`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, JsonError> {
    if body.trim_ascii().is_empty() {
        return Err(JsonError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let value = T::deserialize(&mut de).map_err(classify)?;
    de.end().map_err(|_| JsonError::Trailing)?;
    Ok(value)
}

fn classify(e: serde_json::Error) -> JsonError {
    match e.classify() {
        Category::Data => JsonError::Data(e.to_string()),
        Category::Syntax | Category::Eof | Category::Io => JsonError::Syntax {
            line: e.line(),
            column: e.column(),
        },
    }
}

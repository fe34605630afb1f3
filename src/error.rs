//! Unified error type.

use thiserror::Error;

/// The error type returned by weft's fallible operations.
///
/// Application-level errors (404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// setup mistakes (bad patterns, conflicting routes, bad CORS values) and
/// infrastructure failures (binding a port, reading entropy).
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The matcher rejected a registration: duplicate or conflicting route.
    #[error("route `{pattern}`: {source}")]
    Route {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("invalid pattern `{0}`: expected `<METHOD> <path>` or `<path>`")]
    Pattern(String),

    #[error("invalid socket address `{0}`")]
    Address(String),

    #[error("invalid header value for `{name}`")]
    Header {
        name: &'static str,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("random source unavailable: {0}")]
    Entropy(String),
}

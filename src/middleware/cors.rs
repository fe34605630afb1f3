//! Cross-Origin Resource Sharing.
//!
//! CORS is enforced by browsers, not servers. This middleware only decides
//! which permission headers to attach: a disallowed origin still reaches the
//! handler (or, for a preflight, still gets its `204`) but without the
//! headers the browser needs to let the page read the response.
//!
//! Per request:
//!
//! 1. `Vary: Origin, Access-Control-Request-Method, Access-Control-Request-Headers`
//!    is appended to every response so caches key on them.
//! 2. No `Origin` header: not a cross-origin request, pass through.
//! 3. The origin is allowed if `"*"` was configured or it is in the allow-set.
//! 4. A preflight (`OPTIONS` + `Access-Control-Request-Method`) is answered
//!    here with `204` and never reaches the handler.
//! 5. Anything else goes to the handler; allowed origins get their headers
//!    on the way out.

use std::collections::HashSet;
use std::future;
use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use super::Middleware;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

const DEFAULT_METHODS: &[&str] = &["GET", "POST", "PATCH", "DELETE", "OPTIONS"];
const DEFAULT_HEADERS: &[&str] = &["Content-Type", "Authorization", "X-Request-Id"];
const DEFAULT_EXPOSED: &[&str] = &["ETag", "X-Request-Id"];

const VARY_ON: [&str; 3] = ["Origin", "Access-Control-Request-Method", "Access-Control-Request-Headers"];

/// CORS policy, typically built once at startup or loaded from a config file.
///
/// Empty method/header lists fall back to sensible defaults; an empty origin
/// list allows nothing. `"*"` among the origins allows every origin.
///
/// ```rust
/// use weft::middleware::{Cors, CorsConfig};
///
/// let cors = Cors::new(
///     CorsConfig::default()
///         .allow_origins(["http://localhost:5173", "https://app.example.com"])
///         .allow_credentials(true)
///         .max_age(600),
/// )
/// .unwrap();
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds; `0` omits `Access-Control-Max-Age`.
    pub max_age: u64,
}

impl CorsConfig {
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = secs;
        self
    }
}

/// The CORS middleware. Construct with [`Cors::new`].
pub struct Cors {
    policy: Arc<Policy>,
}

/// [`CorsConfig`] with every lookup and header value computed up front.
#[derive(Debug)]
struct Policy {
    allow_all: bool,
    origins: HashSet<String>,
    methods: HeaderValue,
    headers: HeaderValue,
    exposed: HeaderValue,
    credentials: bool,
    max_age: Option<HeaderValue>,
}

impl Cors {
    /// Validates `config` and precomputes the header values.
    ///
    /// Fails when a configured method or header name cannot appear in an
    /// HTTP header.
    pub fn new(config: CorsConfig) -> Result<Self, Error> {
        let allow_all = config.allowed_origins.iter().any(|o| o == "*");
        let origins = config.allowed_origins.into_iter().filter(|o| o != "*").collect();

        let policy = Policy {
            allow_all,
            origins,
            methods: joined("allowed_methods", &config.allowed_methods, DEFAULT_METHODS)?,
            headers: joined("allowed_headers", &config.allowed_headers, DEFAULT_HEADERS)?,
            exposed: joined("exposed_headers", &config.exposed_headers, DEFAULT_EXPOSED)?,
            credentials: config.allow_credentials,
            max_age: (config.max_age > 0).then(|| HeaderValue::from(config.max_age)),
        };
        tracing::debug!(?policy, "cors policy ready");

        Ok(Self { policy: Arc::new(policy) })
    }
}

fn joined(label: &'static str, values: &[String], fallback: &[&str]) -> Result<HeaderValue, Error> {
    let joined = if values.is_empty() { fallback.join(",") } else { values.join(",") };
    HeaderValue::try_from(joined).map_err(|source| Error::Header { name: label, source })
}

impl Policy {
    /// The wildcard admits any origin, even one that is not visible ASCII.
    fn allows(&self, origin: &HeaderValue) -> bool {
        self.allow_all || origin.to_str().is_ok_and(|o| self.origins.contains(o))
    }

    /// The `Access-Control-Allow-Origin` value, if any.
    ///
    /// `*` is never combined with credentials; browsers reject that pair, so
    /// the literal origin is echoed instead.
    fn allow_origin(&self, origin: &HeaderValue) -> HeaderValue {
        if self.allow_all && !self.credentials {
            HeaderValue::from_static("*")
        } else {
            origin.clone()
        }
    }

    fn preflight(&self, origin: Option<HeaderValue>) -> Response {
        let mut res = Response::status(StatusCode::NO_CONTENT);
        if let Some(origin) = origin {
            let headers = res.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, self.exposed.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            if self.credentials {
                headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
            if let Some(max_age) = &self.max_age {
                headers.insert(ACCESS_CONTROL_MAX_AGE, max_age.clone());
            }
        }
        res
    }

    /// Permission headers for an allowed actual request. They replace any
    /// the handler set itself.
    fn grant(&self, headers: &mut HeaderMap, origin: HeaderValue) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if self.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, self.exposed.clone());
    }
}

fn add_vary(headers: &mut HeaderMap) {
    for value in VARY_ON {
        headers.append(VARY, HeaderValue::from_static(value));
    }
}

fn is_preflight(req: &Request) -> bool {
    req.method() == http::Method::OPTIONS
        && req
            .headers()
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .is_some_and(|v| !v.is_empty())
}

impl Middleware for Cors {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(CorsHandler { policy: Arc::clone(&self.policy), next })
    }
}

struct CorsHandler {
    policy: Arc<Policy>,
    next: BoxedHandler,
}

impl ErasedHandler for CorsHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let origin = req.headers().get(ORIGIN).filter(|v| !v.is_empty()).cloned();

        let Some(origin) = origin else {
            let fut = self.next.call(req);
            return Box::pin(async move {
                let mut res = fut.await;
                add_vary(res.headers_mut());
                res
            });
        };

        let allowed = self.policy.allows(&origin);
        let allow_origin = allowed.then(|| self.policy.allow_origin(&origin));

        if is_preflight(&req) {
            let mut res = self.policy.preflight(allow_origin);
            add_vary(res.headers_mut());
            return Box::pin(future::ready(res));
        }

        let policy = Arc::clone(&self.policy);
        let fut = self.next.call(req);
        Box::pin(async move {
            let mut res = fut.await;
            add_vary(res.headers_mut());
            if let Some(origin) = allow_origin {
                policy.grant(res.headers_mut(), origin);
            }
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::HeaderName;

    use super::*;
    use crate::middleware::testing::{build, request};
    use crate::Router;

    fn app(config: CorsConfig) -> (BoxedHandler, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handler = Router::new()
            .with(Cors::new(config).unwrap())
            .on(crate::Method::Get, "/things", move |_req: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { (StatusCode::ACCEPTED, "reached") }
            })
            .into_handler();
        (handler, hits)
    }

    fn get(res: &Response, name: HeaderName) -> Option<&str> {
        res.headers().get(name).map(|v| v.to_str().unwrap())
    }

    fn vary(res: &Response) -> Vec<&str> {
        res.headers().get_all(VARY).iter().map(|v| v.to_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn no_origin_passes_through_with_vary() {
        let (app, hits) = app(CorsConfig::default().allow_origins(["*"]));
        let res = app.call(build(request("GET", "/things"))).await;

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(vary(&res), VARY_ON);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), None);
    }

    #[tokio::test]
    async fn disallowed_origin_still_reaches_handler() {
        let (app, hits) = app(CorsConfig::default().allow_origins(["https://b.com"]));
        let res = app
            .call(build(request("GET", "/things").header("origin", "https://a.com")))
            .await;

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(res.body(), b"reached");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), None);
        assert_eq!(get(&res, ACCESS_CONTROL_EXPOSE_HEADERS), None);
        assert_eq!(vary(&res).len(), 3);
    }

    #[tokio::test]
    async fn listed_origin_is_echoed() {
        let (app, _) = app(CorsConfig::default().allow_origins(["https://b.com"]));
        let res = app
            .call(build(request("GET", "/things").header("origin", "https://b.com")))
            .await;

        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("https://b.com"));
        assert_eq!(get(&res, ACCESS_CONTROL_EXPOSE_HEADERS), Some("ETag,X-Request-Id"));
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_CREDENTIALS), None);
    }

    #[tokio::test]
    async fn wildcard_preflight_answers_204() {
        let (app, hits) = app(CorsConfig::default().allow_origins(["*"]));
        let res = app
            .call(build(
                request("OPTIONS", "/things")
                    .header("origin", "https://x.com")
                    .header("access-control-request-method", "POST"),
            ))
            .await;

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
        assert!(get(&res, ACCESS_CONTROL_ALLOW_METHODS).unwrap().split(',').any(|m| m == "POST"));
        assert_eq!(
            get(&res, ACCESS_CONTROL_ALLOW_HEADERS),
            Some("Content-Type,Authorization,X-Request-Id")
        );
        assert_eq!(get(&res, ACCESS_CONTROL_MAX_AGE), None);
        assert_eq!(vary(&res).len(), 3);
    }

    #[tokio::test]
    async fn wildcard_with_credentials_echoes_origin() {
        let (app, _) = app(
            CorsConfig::default()
                .allow_origins(["*"])
                .allow_credentials(true),
        );
        let res = app
            .call(build(request("GET", "/things").header("origin", "https://x.com")))
            .await;

        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("https://x.com"));
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_CREDENTIALS), Some("true"));
    }

    #[tokio::test]
    async fn allowed_preflight_carries_full_policy() {
        let (app, _) = app(
            CorsConfig::default()
                .allow_origins(["https://app.example.com"])
                .allow_methods(["GET", "PUT"])
                .allow_headers(["Content-Type"])
                .expose_headers(["ETag"])
                .allow_credentials(true)
                .max_age(600),
        );
        let res = app
            .call(build(
                request("OPTIONS", "/things")
                    .header("origin", "https://app.example.com")
                    .header("access-control-request-method", "PUT"),
            ))
            .await;

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("https://app.example.com"));
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_METHODS), Some("GET,PUT"));
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_HEADERS), Some("Content-Type"));
        assert_eq!(get(&res, ACCESS_CONTROL_EXPOSE_HEADERS), Some("ETag"));
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_CREDENTIALS), Some("true"));
        assert_eq!(get(&res, ACCESS_CONTROL_MAX_AGE), Some("600"));
    }

    #[tokio::test]
    async fn disallowed_preflight_gets_bare_204() {
        let (app, hits) = app(CorsConfig::default().allow_origins(["https://b.com"]));
        let res = app
            .call(build(
                request("OPTIONS", "/things")
                    .header("origin", "https://evil.com")
                    .header("access-control-request-method", "DELETE"),
            ))
            .await;

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), None);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_METHODS), None);
        assert_eq!(vary(&res).len(), 3);
    }

    #[tokio::test]
    async fn plain_options_is_not_a_preflight() {
        let (app, _) = app(CorsConfig::default().allow_origins(["*"]));
        let res = app
            .call(build(request("OPTIONS", "/things").header("origin", "https://x.com")))
            .await;

        // No OPTIONS route: the router answers, CORS headers still attached.
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
    }

    #[tokio::test]
    async fn wildcard_admits_non_ascii_origin() {
        let (app, _) = app(CorsConfig::default().allow_origins(["*"]));
        let origin = HeaderValue::from_bytes(b"https://\xe9.example").unwrap();
        let res = app
            .call(build(request("GET", "/things").header(ORIGIN, origin)))
            .await;

        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
    }

    #[tokio::test]
    async fn listed_origins_must_be_visible_ascii() {
        let (app, _) = app(CorsConfig::default().allow_origins(["https://b.com"]));
        let origin = HeaderValue::from_bytes(b"https://\xe9.example").unwrap();
        let res = app
            .call(build(request("GET", "/things").header(ORIGIN, origin)))
            .await;

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(get(&res, ACCESS_CONTROL_ALLOW_ORIGIN), None);
    }

    #[tokio::test]
    async fn policy_replaces_handler_grant_headers() {
        let handler = Router::new()
            .with(Cors::new(CorsConfig::default().allow_origins(["https://b.com"])).unwrap())
            .get("/things", |_req: Request| async {
                Response::builder()
                    .header("access-control-allow-origin", "https://other.com")
                    .header("access-control-expose-headers", "X-Secret")
                    .text("")
            })
            .into_handler();
        let res = handler
            .call(build(request("GET", "/things").header("origin", "https://b.com")))
            .await;

        let allow: Vec<_> = res
            .headers()
            .get_all(ACCESS_CONTROL_ALLOW_ORIGIN)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(allow, ["https://b.com"]);
        assert_eq!(get(&res, ACCESS_CONTROL_EXPOSE_HEADERS), Some("ETag,X-Request-Id"));
    }

    #[test]
    fn empty_origin_list_allows_nothing() {
        let cors = Cors::new(CorsConfig::default()).unwrap();
        assert!(!cors.policy.allows(&HeaderValue::from_static("https://a.com")));
        assert!(!cors.policy.allow_all);
    }

    #[test]
    fn rejects_unencodable_config() {
        let err = Cors::new(CorsConfig::default().allow_headers(["X-Bad\nHeader"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Header { name: "allowed_headers", .. }));
    }

    #[test]
    fn config_loads_from_json() {
        let config: CorsConfig = serde_json::from_str(
            r#"{"allowed_origins":["*"],"allow_credentials":true,"max_age":60}"#,
        )
        .unwrap();

        assert_eq!(config.allowed_origins, ["*"]);
        assert!(config.allowed_methods.is_empty());
        assert!(config.allow_credentials);
        assert_eq!(config.max_age, 60);
    }
}

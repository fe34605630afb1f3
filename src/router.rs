//! Radix-tree request router with a middleware chain.
//!
//! One tree per HTTP method, plus one for patterns without a method. Path
//! matching is [`matchit`]'s job; the router only picks the tree, reports
//! what the matcher reports, and wraps the result in the middleware chain.

use std::collections::HashMap;
use std::future;
use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::method::Method;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and hand it to [`Server::serve`](crate::Server::serve),
/// which takes ownership: neither routes nor middleware can change while
/// requests are being served.
///
/// ```rust
/// use weft::Router;
/// use weft::middleware::{AccessLog, Recover, SetRequestId};
/// # async fn get_user(_: weft::Request) -> &'static str { "" }
/// # async fn put_user(_: weft::Request) -> &'static str { "" }
///
/// let app = Router::new()
///     .with(SetRequestId::new())
///     .with(AccessLog::new())
///     .with(Recover::new())
///     .get("/users/{id}", get_user)
///     .put("/users/{id}", put_user);
/// ```
pub struct Router {
    routes: Routes,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Routes::default(), middleware: Vec::new() }
    }

    /// Appends a middleware. The first one added runs first on the way in
    /// and last on the way out.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers a `"<METHOD> <path>"` pattern, e.g. `"GET /healthz"`. A bare
    /// `"<path>"` matches every method not registered more specifically.
    ///
    /// Duplicate or conflicting patterns are reported as [`Error::Route`],
    /// never silently overwritten.
    pub fn handle(self, pattern: &str, handler: impl Handler) -> Result<Self, Error> {
        let (method, path) = parse_pattern(pattern)?;
        self.add(method, path, handler.into_boxed_handler())
    }

    /// Registers a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// On a duplicate or conflicting route: a misconfigured router should
    /// never start serving. Use [`Router::handle`] to get the error instead.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(Some(method), path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn head(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Head, path, handler)
    }

    pub fn options(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Options, path, handler)
    }

    fn add(mut self, method: Option<Method>, path: &str, handler: BoxedHandler) -> Result<Self, Error> {
        let tree = match method {
            Some(m) => self.routes.by_method.entry(m).or_default(),
            None => &mut self.routes.any,
        };
        tree.insert(path, handler).map_err(|source| Error::Route {
            pattern: match method {
                Some(m) => format!("{m} {path}"),
                None => path.to_owned(),
            },
            source,
        })?;
        tracing::debug!(method = method.map_or("*", Method::as_str), path, "route registered");
        Ok(self)
    }

    /// Folds the middleware right-to-left around the route table.
    ///
    /// With middleware `[A, B, C]` the result is `A(B(C(endpoint)))`.
    pub fn into_handler(self) -> BoxedHandler {
        let endpoint: BoxedHandler = Arc::new(Endpoint { routes: self.routes });
        self.middleware
            .iter()
            .rev()
            .fold(endpoint, |next, middleware| middleware.wrap(next))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Splits `"<METHOD> <path>"` (or a bare `"<path>"`).
fn parse_pattern(pattern: &str) -> Result<(Option<Method>, &str), Error> {
    let invalid = || Error::Pattern(pattern.to_owned());
    let trimmed = pattern.trim();

    let (method, path) = match trimmed.split_once(' ') {
        Some((token, rest)) => (Some(token.parse().map_err(|()| invalid())?), rest.trim_start()),
        None => (None, trimmed),
    };
    if !path.starts_with('/') {
        return Err(invalid());
    }
    Ok((method, path))
}

#[derive(Default)]
struct Routes {
    by_method: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
}

enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    /// The path exists, but not for this method.
    WrongMethod(Vec<Method>),
    Missing,
}

impl Routes {
    fn lookup(&self, method: Option<Method>, path: &str) -> Lookup {
        let mut trees: Vec<&MatchitRouter<BoxedHandler>> = Vec::with_capacity(3);
        if let Some(m) = method {
            trees.extend(self.by_method.get(&m));
            if m == Method::Head {
                trees.extend(self.by_method.get(&Method::Get));
            }
        }
        trees.push(&self.any);

        for tree in trees {
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                return Lookup::Found(Arc::clone(matched.value), params);
            }
        }

        let mut allowed: Vec<Method> = self.by_method.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            return Lookup::Missing;
        }
        allowed.sort();
        Lookup::WrongMethod(allowed)
    }
}

/// The innermost stage: route table lookup and handler dispatch.
struct Endpoint {
    routes: Routes,
}

impl ErasedHandler for Endpoint {
    fn call(&self, mut req: Request) -> BoxFuture {
        if req.unreadable_body {
            return Box::pin(future::ready(
                Response::builder().status(StatusCode::BAD_REQUEST).text("400 bad request\n"),
            ));
        }

        let method = Method::from_http(req.method());
        match self.routes.lookup(method, req.path()) {
            Lookup::Found(handler, params) => {
                req.params = params;
                handler.call(req)
            }
            Lookup::WrongMethod(allowed) => Box::pin(future::ready(method_not_allowed(&allowed))),
            Lookup::Missing => Box::pin(future::ready(
                Response::builder().status(StatusCode::NOT_FOUND).text("404 page not found\n"),
            )),
        }
    }
}

fn method_not_allowed(allowed: &[Method]) -> Response {
    let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    let mut res = Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .text("method not allowed\n");
    // Built from method tokens only.
    if let Ok(value) = HeaderValue::try_from(allow) {
        res.headers_mut().insert(ALLOW, value);
    }
    res
}

//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! This module provides [`Router`], which dispatches incoming HTTP requests to handler
//! functions based on the request method and URL path. Two pattern styles are supported:
//!
//! | Pattern               | Example match               | Captured params                   |
//! |-----------------------|-----------------------------|-----------------------------------|
//! | `/api/media`          | `/api/media`                | *(none)*                          |
//! | `/*`                  | `/css/site.css`             | `wildcard → "/css/site.css"`      |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/api/media/` and
//! `/api/media` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be shared across connection
/// tasks without copying the underlying closure. Register them with [`Router::get`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait via the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/api/media`.
    Exact(String),
    // Matches any path that starts with the given prefix; `/*` compiles to an empty prefix.
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Parse a route pattern string into a `Pattern`.
    ///
    /// Ends with `/*` → wildcard, otherwise exact. A trailing slash (other than on
    /// the root `/`) is stripped first.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                // `/files/*` must not match `/filesystem`
                if !suffix.is_empty() && !suffix.starts_with('/') {
                    return None;
                }
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn accepts(&self, method: &Method) -> bool {
        &self.method == method || (self.method == Method::Get && *method == Method::Head)
    }
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// Routes are evaluated in registration order. When no route matches the path a
/// `404 Not Found` is returned; when the path matches but only under another
/// method, `405 Method Not Allowed`.
///
/// # Examples
///
/// ```rust,no_run
/// use channelsite::context::Context;
/// use channelsite::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/api/media", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// router.get("/*", |ctx: Context| async move {
///     let path = ctx.params().get("wildcard").unwrap_or("/").to_owned();
///     Response::new(StatusCode::Ok).body(path)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Dispatch a request to the first matching route. This is the innermost
    /// layer of the middleware pipeline.
    ///
    /// `HEAD` is answered by the `GET` handler; the server drops the body.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(ctx.request().path()) else {
                continue;
            };
            if route.accepts(ctx.request().method()) {
                ctx.set_params(params);
                return (route.handler)(ctx).await;
            }
            path_matched = true;
        }

        if path_matched {
            Response::new(StatusCode::MethodNotAllowed).header("Allow", "GET, HEAD")
        } else {
            Response::new(StatusCode::NotFound)
        }
    }
}

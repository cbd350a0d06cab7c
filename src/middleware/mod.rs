//! Middleware pipeline: composable before/after request handler logic.
//!
//! A [`Pipeline`] owns an ordered list of [`Middleware`] layers and a [`Router`]
//! at the centre. Each layer receives a [`Next`] cursor and decides whether to
//! pass the request inward, short-circuit, or decorate the response on the way out.
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`LoggerMiddleware`]: one `tracing` line per request.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A type-erased, reference-counted middleware function.
///
/// The [`Arc`] wrapper makes layers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a layer can forward a request
/// at most once. When every layer has been passed, the router handles the request.
pub struct Next {
    layers: Arc<Vec<MiddlewareHandler>>,
    router: Arc<Router>,
    // Which layer to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Invokes the next layer, or the router once the layers are exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.layers.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer(ctx, self).await
            }
            None => self.router.dispatch(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
/// Implementations must be `Send + Sync` because the pipeline is shared across
/// connection tasks.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// A router wrapped in an ordered stack of middleware layers.
///
/// Layers run outermost first, in the order they were added.
///
/// # Examples
///
/// ```rust,no_run
/// use channelsite::context::Context;
/// use channelsite::{Router, Response, StatusCode};
/// use channelsite::middleware::{LoggerMiddleware, Pipeline};
///
/// let mut router = Router::new();
/// router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
///
/// let pipeline = Pipeline::new(router).layer(LoggerMiddleware);
/// ```
pub struct Pipeline {
    layers: Arc<Vec<MiddlewareHandler>>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            layers: Arc::new(Vec::new()),
            router: Arc::new(router),
        }
    }

    /// Appends a layer inside the ones already added.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        Arc::make_mut(&mut self.layers).push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Runs `request` through every layer and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            layers: Arc::clone(&self.layers),
            router: Arc::clone(&self.router),
            index: 0,
        };
        next.run(Context::new(request)).await
    }
}

/// Logs each request's method, path, status, and duration after the
/// downstream handler completes.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response
        })
    }
}

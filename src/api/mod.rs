//! Application state and the route table.
//!
//! [`AppState`] is built once at startup and shared by every handler through an
//! `Arc`; it owns the two cached fetchers, the media library and the static site.

use std::sync::Arc;

use crate::cache::{CachedFetcher, FetchFailure, Lookup, Warm};
use crate::config::Config;
use crate::context::Context;
use crate::media::MediaLibrary;
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::site::StaticSite;
use crate::youtube::{ContentFetch, StatsFetch, YouTubeClient, YouTubeError};
use crate::{Response, Router, StatusCode};

const STATS_ERROR: &str = "Could not retrieve channel stats";
const CONTENT_ERROR: &str = "Could not retrieve YouTube content";

/// Everything a request handler may need.
pub struct AppState {
    pub stats: Arc<CachedFetcher<StatsFetch>>,
    pub content: Arc<CachedFetcher<ContentFetch>>,
    pub media: MediaLibrary,
    pub site: StaticSite,
}

impl AppState {
    /// Builds the state from validated configuration.
    ///
    /// The cache entries start empty; nothing is fetched here.
    pub fn from_config(config: &Config) -> Self {
        let client = YouTubeClient::new(
            reqwest::Client::new(),
            config.api_key.clone(),
            config.channel_id.clone(),
        )
        .with_base_url(config.api_base_url.clone());

        Self::new(Arc::new(client), config)
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied client.
    pub fn new(client: Arc<YouTubeClient>, config: &Config) -> Self {
        let stats = StatsFetch::new(Arc::clone(&client));
        let content = ContentFetch::new(client, config.latest_videos, config.max_playlists);

        Self {
            stats: Arc::new(CachedFetcher::new(stats, config.cache)),
            content: Arc::new(CachedFetcher::new(content, config.cache)),
            media: MediaLibrary::new(
                config.site_root.clone(),
                config.image_dir.clone(),
                config.video_dir.clone(),
            ),
            site: StaticSite::new(config.site_root.clone()),
        }
    }

    /// The fetchers a startup warm-up should run, in order.
    pub fn warmers(&self) -> Vec<Arc<dyn Warm>> {
        vec![
            Arc::clone(&self.stats) as Arc<dyn Warm>,
            Arc::clone(&self.content) as Arc<dyn Warm>,
        ]
    }
}

/// Registers every route of the site.
///
/// The catch-all `/*` comes last so the API paths win; it also answers `/`.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    let s = Arc::clone(&state);
    router.get("/api/channel-stats", move |_ctx: Context| {
        let state = Arc::clone(&s);
        async move { channel_stats(&state).await }
    });

    let s = Arc::clone(&state);
    router.get("/api/youtube_content", move |_ctx: Context| {
        let state = Arc::clone(&s);
        async move { youtube_content(&state).await }
    });

    let s = Arc::clone(&state);
    router.get("/api/media", move |_ctx: Context| {
        let state = Arc::clone(&s);
        async move { Response::json(StatusCode::Ok, &state.media.scan().await) }
    });

    router.get("/*", move |ctx: Context| {
        let state = Arc::clone(&state);
        async move {
            let path = ctx.params().get("wildcard").unwrap_or("/");
            state.site.serve(path).await
        }
    });

    router
}

/// The router wrapped in request logging, ready for [`Server::run`](crate::Server::run).
pub fn pipeline(state: Arc<AppState>) -> Pipeline {
    Pipeline::new(router(state)).layer(LoggerMiddleware)
}

async fn channel_stats(state: &AppState) -> Response {
    cached_json(state.stats.get().await, STATS_ERROR, |stats| {
        Response::json(StatusCode::Ok, stats)
    })
}

async fn youtube_content(state: &AppState) -> Response {
    cached_json(state.content.get().await, CONTENT_ERROR, |content| {
        Response::json(StatusCode::Ok, content)
    })
}

/// Renders a cache lookup with an `X-Cache` header, or the fixed error body
/// when nothing could be produced.
fn cached_json<T>(
    lookup: Result<Lookup<T>, FetchFailure<YouTubeError>>,
    error_message: &str,
    render: impl FnOnce(&T) -> Response,
) -> Response {
    match lookup {
        Ok(Lookup { value, source }) => render(&value).header("X-Cache", source.as_str()),
        // Already logged by the fetcher.
        Err(_) => Response::error_json(StatusCode::InternalServerError, error_message),
    }
}

//! End-to-end tests: the real pipeline served over TCP, talking to a fake
//! YouTube Data API that is itself served by [`Server`] on an ephemeral port.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use channelsite::api::{self, AppState};
use channelsite::background::spawn_warmup;
use channelsite::cache::CachePolicy;
use channelsite::config::{Config, LaunchMode};
use channelsite::youtube::YouTubeClient;
use channelsite::{Request, Response, Server, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;

const API_KEY: &str = "test-key";

fn channels_body() -> Value {
    json!({
        "items": [{
            "id": "UC123",
            "statistics": {
                "viewCount": "5000",
                "subscriberCount": "100",
                "hiddenSubscriberCount": false,
                "videoCount": "12"
            }
        }]
    })
}

fn search_body() -> Value {
    json!({
        "items": [{
            "id": {"kind": "youtube#video", "videoId": "vid1"},
            "snippet": {
                "title": "Season opener",
                "publishedAt": "2024-03-01T18:00:00Z",
                "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/vid1/hqdefault.jpg"}}
            }
        }]
    })
}

fn playlists_body() -> Value {
    json!({
        "items": [{
            "id": "PL1",
            "snippet": {"title": "Highlights", "thumbnails": {}},
            "contentDetails": {"itemCount": 7}
        }]
    })
}

/// Canned YouTube API. Counts every call and can be switched to answer 500.
#[derive(Clone)]
struct FakeYouTube {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl FakeYouTube {
    async fn start() -> Self {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(AtomicBool::new(false));

        let (c, f) = (Arc::clone(&calls), Arc::clone(&failing));
        tokio::spawn(server.run(move |req: Request| {
            let (calls, failing) = (Arc::clone(&c), Arc::clone(&f));
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if failing.load(Ordering::SeqCst) {
                    return Response::error_json(StatusCode::InternalServerError, "backend error");
                }
                if !req
                    .query_string()
                    .is_some_and(|q| q.contains(&format!("key={API_KEY}")))
                {
                    return Response::error_json(StatusCode::BadRequest, "missing key");
                }
                match req.path() {
                    "/channels" => Response::json(StatusCode::Ok, &channels_body()),
                    "/search" => Response::json(StatusCode::Ok, &search_body()),
                    "/playlists" => Response::json(StatusCode::Ok, &playlists_body()),
                    _ => Response::new(StatusCode::NotFound),
                }
            }
        }));

        Self {
            addr,
            calls,
            failing,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn config(site_root: &Path, fake: &FakeYouTube, ttl: Duration) -> Config {
    Config {
        bind: "127.0.0.1:0".parse().unwrap(),
        site_root: site_root.to_path_buf(),
        api_key: Some(API_KEY.to_string()),
        channel_id: "UC123".to_string(),
        api_base_url: format!("http://{}", fake.addr),
        cache: CachePolicy {
            ttl,
            fetch_timeout: Duration::from_secs(5),
        },
        latest_videos: 4,
        max_playlists: 25,
        image_dir: "images/slideshow".to_string(),
        video_dir: "videos/slideshow".to_string(),
        launch_mode: LaunchMode::Direct,
    }
}

fn state_for(config: &Config) -> Arc<AppState> {
    let client = YouTubeClient::new(http(), config.api_key.clone(), config.channel_id.clone())
        .with_base_url(config.api_base_url.clone());
    Arc::new(AppState::new(Arc::new(client), config))
}

/// Serves the site pipeline on an ephemeral port and returns its base URL.
async fn serve(state: Arc<AppState>) -> String {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let pipeline = Arc::new(api::pipeline(state));
    tokio::spawn(server.run(move |req| {
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.handle(req).await }
    }));
    format!("http://{addr}")
}

fn site_root() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    fs::write(dir.path().join("index.html"), "<h1>channel</h1>").unwrap();
    fs::create_dir_all(dir.path().join("videos/slideshow")).unwrap();
    fs::write(dir.path().join("videos/slideshow/welcome.mp4"), b"\0\0").unwrap();
    dir
}

async fn get(base: &str, path: &str) -> (u16, Option<String>, Value) {
    let res = http().get(format!("{base}{path}")).send().await.unwrap();
    let status = res.status().as_u16();
    let cache = res
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = res.json().await.unwrap_or(Value::Null);
    (status, cache, body)
}

#[tokio::test]
async fn stats_are_fetched_once_then_served_from_cache() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let base = serve(state_for(&config(root.path(), &fake, Duration::from_secs(3600)))).await;

    let (status, cache, body) = get(&base, "/api/channel-stats").await;
    assert_eq!(status, 200);
    assert_eq!(cache.as_deref(), Some("miss"));
    assert_eq!(body, json!({"subscribers": "100", "views": "5000"}));
    assert_eq!(fake.calls(), 1);

    let (status, cache, again) = get(&base, "/api/channel-stats").await;
    assert_eq!(status, 200);
    assert_eq!(cache.as_deref(), Some("hit"));
    assert_eq!(again, body);
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn content_combines_search_and_playlists() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let base = serve(state_for(&config(root.path(), &fake, Duration::from_secs(3600)))).await;

    let (status, _, body) = get(&base, "/api/youtube_content").await;

    assert_eq!(status, 200);
    assert_eq!(body["latest_videos"][0]["id"], "vid1");
    assert_eq!(body["latest_videos"][0]["title"], "Season opener");
    assert_eq!(
        body["latest_videos"][0]["thumbnail"],
        "https://i.ytimg.com/vi/vid1/hqdefault.jpg"
    );
    assert_eq!(body["playlists"][0]["id"], "PL1");
    assert_eq!(body["playlists"][0]["video_count"], 7);
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn failing_api_after_expiry_serves_stale_data() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    // TTL zero: every request goes to the API.
    let base = serve(state_for(&config(root.path(), &fake, Duration::ZERO))).await;

    let (_, _, fresh) = get(&base, "/api/channel-stats").await;
    fake.fail();

    let (status, cache, stale) = get(&base, "/api/channel-stats").await;
    assert_eq!(status, 200);
    assert_eq!(cache.as_deref(), Some("stale"));
    assert_eq!(stale, fresh);
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn failing_api_with_empty_cache_is_500() {
    let fake = FakeYouTube::start().await;
    fake.fail();
    let root = site_root();
    let base = serve(state_for(&config(root.path(), &fake, Duration::from_secs(3600)))).await;

    let (status, cache, body) = get(&base, "/api/youtube_content").await;

    assert_eq!(status, 500);
    assert_eq!(cache, None);
    assert_eq!(body, json!({"error": "Could not retrieve YouTube content"}));
}

#[tokio::test]
async fn missing_api_key_never_reaches_the_api() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let mut config = config(root.path(), &fake, Duration::from_secs(3600));
    config.api_key = None;
    let base = serve(state_for(&config)).await;

    let (status, _, body) = get(&base, "/api/channel-stats").await;

    assert_eq!(status, 500);
    assert_eq!(body, json!({"error": "Could not retrieve channel stats"}));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn warmup_fills_both_caches() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let state = state_for(&config(root.path(), &fake, Duration::from_secs(3600)));

    spawn_warmup(state.warmers()).join().await;
    assert_eq!(fake.calls(), 3);

    let base = serve(state).await;
    let (_, stats_cache, _) = get(&base, "/api/channel-stats").await;
    let (_, content_cache, _) = get(&base, "/api/youtube_content").await;
    assert_eq!(stats_cache.as_deref(), Some("hit"));
    assert_eq!(content_cache.as_deref(), Some("hit"));
    assert_eq!(fake.calls(), 3);
}

#[tokio::test]
async fn media_lists_videos_when_image_dir_is_missing() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let base = serve(state_for(&config(root.path(), &fake, Duration::from_secs(3600)))).await;

    let (status, _, body) = get(&base, "/api/media").await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!([{"type": "video", "path": "videos/slideshow/welcome.mp4"}])
    );
}

#[tokio::test]
async fn static_files_and_unknown_methods() {
    let fake = FakeYouTube::start().await;
    let root = site_root();
    let base = serve(state_for(&config(root.path(), &fake, Duration::from_secs(3600)))).await;
    let client = http();

    let index = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(index.status().as_u16(), 200);
    assert_eq!(
        index.headers()["content-type"].to_str().unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(index.text().await.unwrap(), "<h1>channel</h1>");

    let head = client.head(format!("{base}/")).send().await.unwrap();
    assert_eq!(head.status().as_u16(), 200);
    assert_eq!(head.headers()["content-length"].to_str().unwrap(), "16");

    let missing = client.get(format!("{base}/nope.js")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    let post = client
        .post(format!("{base}/api/channel-stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(post.status().as_u16(), 405);
    assert_eq!(fake.calls(), 0);
}

//! Minimal YouTube Data API v3 client.

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::models::{
    ChannelContent, ChannelListResponse, ChannelStats, Playlist, PlaylistListResponse,
    SearchListResponse,
};

/// Public endpoint of the Data API.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Errors that can occur when talking to the YouTube Data API.
#[derive(Debug, Error)]
pub enum YouTubeError {
    /// No API key was configured; no request is attempted.
    #[error("YOUTUBE_API_KEY is not set")]
    MissingApiKey,

    /// Transport failure, non-2xx status, or an undecodable body. The URL is
    /// stripped from the inner error since its query string carries the key.
    #[error("YouTube API request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// `channels.list` returned no channel for the configured id.
    #[error("channel {0} not found")]
    ChannelNotFound(String),
}

/// Client for the handful of read-only calls the site needs.
///
/// The API key is optional at construction time: a site without one still
/// serves static files, and each call fails with [`YouTubeError::MissingApiKey`].
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    channel_id: String,
}

impl YouTubeClient {
    pub fn new(http: Client, api_key: Option<String>, channel_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            channel_id: channel_id.into(),
        }
    }

    /// Points the client at another API root, e.g. a local fake in tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch subscriber/view counts of the channel.
    ///
    /// # Errors
    /// * [`YouTubeError::MissingApiKey`] if no key is configured
    /// * [`YouTubeError::ChannelNotFound`] if the API knows no such channel
    /// * [`YouTubeError::Request`] on any transport or status error
    pub async fn channel_stats(&self) -> Result<ChannelStats, YouTubeError> {
        let response: ChannelListResponse = self
            .get_json(
                "channels",
                &[("part", "statistics"), ("id", self.channel_id.as_str())],
            )
            .await?;

        response
            .items
            .into_iter()
            .next()
            .map(|channel| channel.statistics.into())
            .ok_or_else(|| YouTubeError::ChannelNotFound(self.channel_id.clone()))
    }

    /// Fetch the newest uploads and the public playlists of the channel.
    ///
    /// Both API calls run concurrently; either failing fails the whole fetch.
    pub async fn channel_content(
        &self,
        latest_videos: u32,
        max_playlists: u32,
    ) -> Result<ChannelContent, YouTubeError> {
        let video_limit = latest_videos.to_string();
        let playlist_limit = max_playlists.to_string();

        let search_query = [
            ("part", "snippet"),
            ("channelId", self.channel_id.as_str()),
            ("maxResults", video_limit.as_str()),
            ("order", "date"),
            ("type", "video"),
        ];
        let playlist_query = [
            ("part", "snippet,contentDetails"),
            ("channelId", self.channel_id.as_str()),
            ("maxResults", playlist_limit.as_str()),
        ];

        let search = self.get_json::<SearchListResponse>("search", &search_query);
        let playlists = self.get_json::<PlaylistListResponse>("playlists", &playlist_query);

        let (search, playlists) = tokio::try_join!(search, playlists)?;

        Ok(ChannelContent {
            latest_videos: search
                .items
                .into_iter()
                .filter_map(|hit| hit.into_video())
                .collect(),
            playlists: playlists.items.into_iter().map(Playlist::from).collect(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, YouTubeError> {
        let key = self.api_key.as_deref().ok_or(YouTubeError::MissingApiKey)?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);

        debug!(endpoint, channel = %self.channel_id, "calling YouTube Data API");

        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("key", key)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(redacted)?;

        response.json::<T>().await.map_err(redacted)
    }
}

fn redacted(e: reqwest::Error) -> YouTubeError {
    YouTubeError::Request(e.without_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        // Unroutable base URL: reaching the network would surface as Request, not MissingApiKey.
        let client = YouTubeClient::new(Client::new(), None, "UC123")
            .with_base_url("http://127.0.0.1:1/youtube/v3");

        assert!(!client.has_api_key());
        assert!(matches!(
            client.channel_stats().await,
            Err(YouTubeError::MissingApiKey)
        ));
        assert!(matches!(
            client.channel_content(4, 25).await,
            Err(YouTubeError::MissingApiKey)
        ));
    }

    #[test]
    fn defaults_to_public_endpoint() {
        let client = YouTubeClient::new(Client::new(), Some("k".into()), "UC123");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.channel_id(), "UC123");
    }
}

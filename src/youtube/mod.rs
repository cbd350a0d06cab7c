//! YouTube Data API access and the two cached fetch operations built on it.

pub mod client;
pub mod models;

use std::sync::Arc;

pub use client::{DEFAULT_BASE_URL, YouTubeClient, YouTubeError};
pub use models::{ChannelContent, ChannelStats, Playlist, Video};

use crate::cache::Fetch;

/// `channels.list` statistics for the configured channel.
pub struct StatsFetch {
    client: Arc<YouTubeClient>,
}

impl StatsFetch {
    pub fn new(client: Arc<YouTubeClient>) -> Self {
        Self { client }
    }
}

impl Fetch for StatsFetch {
    type Output = ChannelStats;
    type Error = YouTubeError;

    fn name(&self) -> &'static str {
        "channel-stats"
    }

    async fn fetch(&self) -> Result<ChannelStats, YouTubeError> {
        self.client.channel_stats().await
    }
}

/// Latest uploads plus public playlists.
///
/// A response with neither videos nor playlists is treated as not worth
/// caching: the API occasionally answers that way under quota pressure.
pub struct ContentFetch {
    client: Arc<YouTubeClient>,
    latest_videos: u32,
    max_playlists: u32,
}

impl ContentFetch {
    pub fn new(client: Arc<YouTubeClient>, latest_videos: u32, max_playlists: u32) -> Self {
        Self {
            client,
            latest_videos,
            max_playlists,
        }
    }
}

impl Fetch for ContentFetch {
    type Output = ChannelContent;
    type Error = YouTubeError;

    fn name(&self) -> &'static str {
        "channel-content"
    }

    async fn fetch(&self) -> Result<ChannelContent, YouTubeError> {
        self.client
            .channel_content(self.latest_videos, self.max_playlists)
            .await
    }

    fn is_meaningful(&self, value: &ChannelContent) -> bool {
        !value.is_empty()
    }
}

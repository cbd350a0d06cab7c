//! YouTube Data API v3 response shapes and the trimmed types the site serves.
//!
//! Only the fields the site reads are modelled; everything else in the API
//! payloads is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `/api/channel-stats` body.
///
/// Counts stay strings: that is how the API returns them, and the frontend
/// formats them itself. `subscribers` is `None` when the channel hides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub subscribers: Option<String>,
    pub views: Option<String>,
}

/// Recent uploads and public playlists of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelContent {
    pub latest_videos: Vec<Video>,
    pub playlists: Vec<Playlist>,
}

impl ChannelContent {
    pub fn is_empty(&self) -> bool {
        self.latest_videos.is_empty() && self.playlists.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub video_count: u64,
    pub thumbnail: Option<String>,
}

// ── Wire types ───────────────────────────────────────────────────────────────

/// `channels.list?part=statistics`
#[derive(Debug, Deserialize)]
pub(crate) struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelResource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelResource {
    pub statistics: ApiStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiStatistics {
    pub view_count: Option<String>,
    pub subscriber_count: Option<String>,
}

impl From<ApiStatistics> for ChannelStats {
    fn from(s: ApiStatistics) -> Self {
        Self {
            subscribers: s.subscriber_count,
            views: s.view_count,
        }
    }
}

/// `search.list?part=snippet&type=video`
#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    pub id: SearchResultId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResultId {
    pub video_id: Option<String>,
}

/// `playlists.list?part=snippet,contentDetails`
#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistListResponse {
    #[serde(default)]
    pub items: Vec<PlaylistResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistResource {
    pub id: String,
    pub snippet: Snippet,
    pub content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistContentDetails {
    #[serde(default)]
    pub item_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Snippet {
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
}

impl Thumbnails {
    /// Largest of the sizes the site uses, falling back to smaller ones.
    pub fn best(self) -> Option<String> {
        self.high
            .or(self.medium)
            .or(self.default)
            .map(|thumb| thumb.url)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

impl SearchResult {
    /// Search hits without a video id (channels, playlists) are dropped.
    pub fn into_video(self) -> Option<Video> {
        let id = self.id.video_id?;
        Some(Video {
            id,
            title: self.snippet.title,
            thumbnail: self.snippet.thumbnails.best(),
            published_at: self.snippet.published_at,
        })
    }
}

impl From<PlaylistResource> for Playlist {
    fn from(p: PlaylistResource) -> Self {
        Self {
            id: p.id,
            title: p.snippet.title,
            video_count: p.content_details.map_or(0, |d| d.item_count),
            thumbnail: p.snippet.thumbnails.best(),
        }
    }
}

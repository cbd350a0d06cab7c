//! Slideshow media discovery for `/api/media`.
//!
//! Two directories under the site root are scanned on every request, one for
//! images and one for videos. A directory that is missing or unreadable is a
//! warning, never an error: it simply contributes no entries.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
        }
    }

    fn accepts(self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
    }
}

/// One slideshow entry. `path` is relative to the site root and uses `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub path: String,
}

/// The two slideshow directories of a site.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
    image_dir: String,
    video_dir: String,
}

impl MediaLibrary {
    /// `image_dir` and `video_dir` are relative to `root`, written with `/`
    /// exactly as they should appear in the returned paths.
    pub fn new(
        root: impl Into<PathBuf>,
        image_dir: impl Into<String>,
        video_dir: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            image_dir: image_dir.into(),
            video_dir: video_dir.into(),
        }
    }

    /// Lists images first, then videos, each sorted by file name.
    pub async fn scan(&self) -> Vec<MediaItem> {
        let mut items = self.scan_dir(&self.image_dir, MediaKind::Image).await;
        items.extend(self.scan_dir(&self.video_dir, MediaKind::Video).await);
        items
    }

    async fn scan_dir(&self, dir: &str, kind: MediaKind) -> Vec<MediaItem> {
        let names = match list_files(&self.root.join(dir)).await {
            Ok(names) => names,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(directory = dir, "media directory not found");
                return Vec::new();
            }
            Err(e) => {
                warn!(directory = dir, error = %e, "media directory unreadable");
                return Vec::new();
            }
        };

        let prefix = dir.trim_end_matches('/');
        let mut items: Vec<MediaItem> = names
            .into_iter()
            .filter(|name| kind.accepts(name))
            .map(|name| MediaItem {
                kind,
                path: format!("{prefix}/{name}"),
            })
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(directory = dir, count = items.len(), "media directory scanned");
        items
    }
}

/// File names (not directories) directly inside `dir`.
async fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!(name = ?raw, "skipping non UTF-8 file name"),
        }
    }

    Ok(names)
}

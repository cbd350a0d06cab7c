//! Static file serving from the site root.

use std::io;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::{Response, StatusCode};

const INDEX_FILE: &str = "index.html";

/// Serves files below a single root directory.
#[derive(Debug, Clone)]
pub struct StaticSite {
    root: PathBuf,
}

impl StaticSite {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Answers a `GET` for `request_path` (still percent-encoded, leading `/`).
    ///
    /// `/` and directories resolve to their `index.html`. Anything that would
    /// escape the root answers 404, the same as a missing file.
    pub async fn serve(&self, request_path: &str) -> Response {
        let decoded = match percent_decode_str(request_path).decode_utf8() {
            Ok(decoded) => decoded,
            Err(_) => return Response::new(StatusCode::BadRequest).body("Bad Request"),
        };

        let Some(relative) = sanitize(&decoded) else {
            debug!(path = %decoded, "rejected path outside the site root");
            return not_found();
        };

        let mut path = self.root.join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => path.push(INDEX_FILE),
            Ok(_) => {}
            Err(e) => return read_error(&path, e),
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Response::new(StatusCode::Ok)
                .header("Content-Type", content_type(&path))
                .body_bytes(bytes),
            Err(e) => read_error(&path, e),
        }
    }
}

/// Turns a decoded URL path into a relative filesystem path, or `None` if any
/// segment could climb out of the root or smuggle in a separator.
fn sanitize(decoded: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains(['\\', '\0', ':']) => return None,
            s => relative.push(s),
        }
    }
    Some(relative)
}

fn read_error(path: &Path, e: io::Error) -> Response {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => not_found(),
        _ => {
            warn!(path = %path.display(), error = %e, "failed to read static file");
            Response::new(StatusCode::InternalServerError)
        }
    }
}

fn not_found() -> Response {
    Response::new(StatusCode::NotFound).body("Not Found")
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogg") => "video/ogg",
        Some("pdf") => "application/pdf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

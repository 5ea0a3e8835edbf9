//! Asset collaborator seams: identifier -> URL, URL -> decoded image size

use async_trait::async_trait;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to read asset {url}: {source}")]
    Io {
        url: String,
        source: std::io::Error,
    },

    #[error("Failed to decode image {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Resolves catalog image identifiers to retrievable URLs
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> String;
}

/// Joins relative identifiers onto a base URL; absolute URLs pass through
#[derive(Debug, Clone, Default)]
pub struct BaseUrlResolver {
    base: Option<String>,
}

impl BaseUrlResolver {
    pub fn new(base: Option<String>) -> Self {
        Self { base }
    }
}

impl AssetResolver for BaseUrlResolver {
    fn resolve(&self, identifier: &str) -> String {
        let absolute = identifier.contains("://") || identifier.starts_with("data:");
        match &self.base {
            Some(base) if !absolute => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                identifier.trim_start_matches('/')
            ),
            _ => identifier.to_string(),
        }
    }
}

/// Loads an image far enough to know its natural size
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<ImageInfo, AssetError>;
}

/// Reads PNG files from local disk. `file://` URLs and plain paths are
/// accepted; relative paths are taken from `root`.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
}

impl FsImageLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, AssetError> {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        if raw.contains("://") || raw.starts_with("data:") {
            return Err(AssetError::NotFound(url.to_string()));
        }
        Ok(self.root.join(raw))
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, url: &str) -> Result<ImageInfo, AssetError> {
        let path = self.path_for(url)?;
        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(url.to_string())
            } else {
                AssetError::Io { url: url.to_string(), source }
            }
        })?;
        let info = decode_png_header(url, bytes)?;
        debug!(url, width = info.width, height = info.height, "image loaded");
        Ok(info)
    }
}

pub fn decode_png_header(url: &str, bytes: Vec<u8>) -> Result<ImageInfo, AssetError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = decoder.read_info().map_err(|e| AssetError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let info = reader.info();
    Ok(ImageInfo::new(info.width, info.height))
}

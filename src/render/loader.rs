//! Image loading for image elements.
//!
//! Loading an image is the render pipeline's suspension point. Sources are:
//!
//! - `data:` URLs with a base64 payload (what drag-and-drop produces)
//! - `http://` / `https://` URLs, downloaded with reqwest
//! - anything else, read as a local file path
//!
//! Decoded images are cached by source string, so a batch that reuses the
//! same frame art decodes it once. The cache holds at most
//! [`IMAGE_CACHE_BYTES`] of decoded pixels; the oldest entries are evicted
//! first and an image larger than the whole budget is never cached.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RenderConfig;
use crate::error::{CardpressError, Result};

/// Anything that can turn an image source string into pixels.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, src: &str) -> Result<Arc<DynamicImage>>;
}

/// Default budget for decoded pixels held by an [`ImageFetcher`].
pub const IMAGE_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Decoded images keyed by source string, evicted oldest first.
#[derive(Default)]
struct ImageCache {
    entries: HashMap<String, Arc<DynamicImage>>,
    order: VecDeque<String>,
    bytes: usize,
}

impl ImageCache {
    fn get(&self, src: &str) -> Option<Arc<DynamicImage>> {
        self.entries.get(src).cloned()
    }

    fn insert(&mut self, src: &str, image: Arc<DynamicImage>, limit: usize) {
        let size = image.as_bytes().len();
        if size > limit || self.entries.contains_key(src) {
            return;
        }
        while self.bytes + size > limit {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.bytes -= evicted.as_bytes().len();
            }
        }
        self.bytes += size;
        self.order.push_back(src.to_string());
        self.entries.insert(src.to_string(), image);
    }
}

/// Default [`ImageSource`]: data URLs, HTTP(S) and files, with a cache.
pub struct ImageFetcher {
    http_client: reqwest::Client,
    cache: RwLock<ImageCache>,
    cache_limit: usize,
    base_dir: Option<PathBuf>,
}

impl ImageFetcher {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CardpressError::Image(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            http_client,
            cache: RwLock::new(ImageCache::default()),
            cache_limit: IMAGE_CACHE_BYTES,
            base_dir: None,
        })
    }

    /// Resolve relative file paths against `dir` (the template's directory).
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Cap the decoded pixels kept in the cache, in bytes.
    pub fn with_cache_limit(mut self, bytes: usize) -> Self {
        self.cache_limit = bytes;
        self
    }

    /// Number of decoded images held in the cache.
    pub async fn cached(&self) -> usize {
        self.cache.read().await.entries.len()
    }

    /// Decoded bytes held in the cache.
    pub async fn cached_bytes(&self) -> usize {
        self.cache.read().await.bytes
    }

    async fn fetch_bytes(&self, src: &str) -> Result<Vec<u8>> {
        if src.starts_with("data:") {
            return decode_data_url(src);
        }
        if is_remote(src) {
            let response = self
                .http_client
                .get(src)
                .send()
                .await
                .map_err(|e| CardpressError::Image(format!("Failed to download {}: {}", src, e)))?;
            if !response.status().is_success() {
                return Err(CardpressError::Image(format!(
                    "Failed to download {}: HTTP {}",
                    src,
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| CardpressError::Image(format!("Failed to read image data: {}", e)))?;
            return Ok(bytes.to_vec());
        }

        let path = match &self.base_dir {
            Some(dir) => dir.join(src),
            None => PathBuf::from(src),
        };
        tokio::fs::read(&path)
            .await
            .map_err(|e| CardpressError::Image(format!("Failed to read {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn load(&self, src: &str) -> Result<Arc<DynamicImage>> {
        if let Some(image) = self.cache.read().await.get(src) {
            return Ok(image);
        }

        let bytes = self.fetch_bytes(src).await?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| CardpressError::Image(format!("Failed to decode image: {}", e)))?;
        let image = Arc::new(image);
        debug!("[images] decoded {}x{} from {}", image.width(), image.height(), short(src));

        self.cache.write().await.insert(src, image.clone(), self.cache_limit);
        Ok(image)
    }
}

/// True for `http://` and `https://` sources.
pub fn is_remote(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Route a remote source through an image proxy: `proxy + encodeURIComponent(src)`.
///
/// Non-remote sources and a missing proxy leave `src` unchanged.
pub fn apply_proxy(src: &str, proxy: Option<&str>) -> String {
    match proxy {
        Some(proxy) if !proxy.is_empty() && is_remote(src) => {
            format!("{}{}", proxy, encode_uri_component(src))
        }
        _ => src.to_string(),
    }
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Decode the payload of a `data:` URL.
pub fn decode_data_url(src: &str) -> Result<Vec<u8>> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| CardpressError::Image("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| CardpressError::Image("data URL has no payload".into()))?;
    if meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        BASE64
            .decode(payload.trim())
            .map_err(|e| CardpressError::Image(format!("invalid base64 in data URL: {}", e)))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Build a base64 data URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

fn short(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(
            encode_uri_component("https://x.test/a b.png?q=1&r=(2)"),
            "https%3A%2F%2Fx.test%2Fa%20b.png%3Fq%3D1%26r%3D(2)"
        );
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn proxy_only_applies_to_remote_sources() {
        let proxy = Some("https://proxy.test/?url=");
        assert_eq!(
            apply_proxy("http://img.test/a.png", proxy),
            "https://proxy.test/?url=http%3A%2F%2Fimg.test%2Fa.png"
        );
        assert_eq!(apply_proxy("data:image/png;base64,AA", proxy), "data:image/png;base64,AA");
        assert_eq!(apply_proxy("http://img.test/a.png", None), "http://img.test/a.png");
    }

    #[test]
    fn data_url_round_trip() {
        let url = encode_data_url("image/png", b"\x89PNG");
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&url).unwrap(), b"\x89PNG");
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,***").is_err());
    }

    #[tokio::test]
    async fn loads_and_caches_data_urls() {
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let url = encode_data_url("image/png", &png_bytes(4, 2));
        let first = fetcher.load(&url).await.unwrap();
        assert_eq!((first.width(), first.height()), (4, 2));
        let second = fetcher.load(&url).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.cached().await, 1);
    }

    #[tokio::test]
    async fn cache_evicts_oldest_beyond_its_byte_limit() {
        // 4x4 RGBA is 64 bytes; room for three of them
        let fetcher = ImageFetcher::new(&RenderConfig::default())
            .unwrap()
            .with_cache_limit(200);
        let urls: Vec<String> = (1..=5u8)
            .map(|n| {
                let img = RgbaImage::from_pixel(4, 4, Rgba([n, 0, 0, 255]));
                let mut bytes = Vec::new();
                img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
                encode_data_url("image/png", &bytes)
            })
            .collect();

        let first = fetcher.load(&urls[0]).await.unwrap();
        for url in &urls[1..] {
            fetcher.load(url).await.unwrap();
        }
        assert_eq!(fetcher.cached().await, 3);
        assert_eq!(fetcher.cached_bytes().await, 192);

        // the first image was evicted and decodes again
        let again = fetcher.load(&urls[0]).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(fetcher.cached().await, 3);

        // an image bigger than the whole budget is returned but not kept
        let big = encode_data_url("image/png", &png_bytes(16, 16));
        assert_eq!(fetcher.load(&big).await.unwrap().width(), 16);
        assert_eq!(fetcher.cached().await, 3);
        assert!(fetcher.cached_bytes().await <= 200);
    }

    #[tokio::test]
    async fn undecodable_and_missing_sources_fail() {
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let garbage = encode_data_url("image/png", b"not an image");
        assert!(matches!(fetcher.load(&garbage).await, Err(CardpressError::Image(_))));
        assert!(fetcher.load("/nonexistent/cardpress/art.png").await.is_err());
        assert_eq!(fetcher.cached().await, 0);
    }
}

//! Runtime configuration for rendering and serving.

use std::path::PathBuf;

/// Default density multiplier between template units and output pixels.
pub const DEFAULT_PIXEL_RATIO: f32 = 2.0;

/// Default number of cards rendered concurrently by the batch renderer.
pub const DEFAULT_BATCH_WINDOW: usize = 5;

/// Rendering configuration shared by the CLI, the server and tests.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Output pixels per template unit.
    pub pixel_ratio: f32,
    /// Cards in flight at once during a batch render.
    pub batch_window: usize,
    /// Prefix applied to remote dynamic image sources (`proxy + encodeURIComponent(src)`).
    pub image_proxy: Option<String>,
    /// Directory scanned for `.ttf` / `.otf` font files.
    pub fonts_dir: Option<PathBuf>,
    /// Font used for families that have no file in `fonts_dir`.
    pub default_font: Option<PathBuf>,
    /// User-Agent header for image downloads.
    pub user_agent: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            batch_window: DEFAULT_BATCH_WINDOW,
            image_proxy: None,
            fonts_dir: None,
            default_font: None,
            user_agent: format!("cardpress/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RenderConfig {
    /// The batch window, never zero.
    pub fn window(&self) -> usize {
        self.batch_window.max(1)
    }

    /// Output pixel dimensions for a template of the given logical size.
    pub fn output_size(&self, width: f32, height: f32) -> (u32, u32) {
        let scale = |v: f32| (v * self.pixel_ratio).round().max(1.0) as u32;
        (scale(width), scale(height))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub listen_addr: String,
    /// Directory holding the persisted editing session. `None` keeps it in memory.
    pub state_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            state_dir: None,
        }
    }
}

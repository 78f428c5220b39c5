//! # Render Engine
//!
//! Turns a template plus one record into a card image.
//!
//! A render runs in three steps:
//!
//! 1. **Plan**: walk the elements in draw order (ascending `zIndex`, stable),
//!    resolve each one's content and geometry, and wrap text. The plan is a
//!    [`CardLayout`] and is also returned alongside the pixels.
//! 2. **Load**: fetch every image element's source concurrently through the
//!    [`ImageSource`]. An image that fails to load is logged and left out;
//!    the rest of the card still renders.
//! 3. **Draw**: composite the elements onto a transparent canvas at
//!    `pixel_ratio` pixels per template unit.
//!
//! ## Modules
//!
//! - [`canvas`]: RGBA surface with source-over blending
//! - [`color`]: CSS colour parsing
//! - [`font`]: font book, outline and bitmap faces
//! - [`loader`]: image sources (data URLs, HTTP, files) and the decode cache
//! - [`text`]: text box layout and drawing

pub mod canvas;
pub mod color;
pub mod font;
pub mod loader;
pub mod text;

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{debug, warn};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;

use crate::binding::{resolve_image_source, resolve_text};
use crate::config::RenderConfig;
use crate::error::{CardpressError, Result};
use crate::layout::{self, Fit, Geometry};
use crate::record::Record;
use crate::template::{Element, Template};
use canvas::Canvas;
use font::FontBook;
use loader::{ImageFetcher, ImageSource, apply_proxy};

/// What one element resolved to for a particular record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElementContent {
    Text {
        text: String,
        lines: Vec<String>,
    },
    Image {
        src: String,
        /// Placement inside the box, known once the image has loaded.
        fit: Option<Fit>,
        loaded: bool,
    },
}

/// Resolved placement of one element, in template units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementLayout {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub z_index: f32,
    pub opacity: f32,
    pub content: ElementContent,
}

impl ElementLayout {
    /// Resolved text, or `None` for images.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            ElementContent::Text { text, .. } => Some(text.as_str()),
            ElementContent::Image { .. } => None,
        }
    }

    /// Resolved image source, or `None` for text.
    pub fn image_source(&self) -> Option<&str> {
        match &self.content {
            ElementContent::Image { src, .. } => Some(src.as_str()),
            ElementContent::Text { .. } => None,
        }
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            width: self.width,
            height: self.height,
        }
    }
}

/// Layout of a whole card: elements in the order they are drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLayout {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
    pub elements: Vec<ElementLayout>,
}

impl CardLayout {
    pub fn element(&self, id: &str) -> Option<&ElementLayout> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// A rendered card.
#[derive(Debug, Clone)]
pub struct CardImage {
    pub pixels: RgbaImage,
    pub layout: CardLayout,
}

impl CardImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png_bytes = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| CardpressError::Render(format!("PNG encoding failed: {}", e)))?;
        Ok(png_bytes)
    }
}

/// Renders cards. Cheap to clone; clones share fonts and the image cache.
#[derive(Clone)]
pub struct RenderEngine {
    config: RenderConfig,
    fonts: Arc<FontBook>,
    images: Arc<dyn ImageSource>,
}

impl RenderEngine {
    pub fn new(config: RenderConfig, fonts: FontBook, images: Arc<dyn ImageSource>) -> Self {
        Self {
            config,
            fonts: Arc::new(fonts),
            images,
        }
    }

    /// Build an engine with fonts and an [`ImageFetcher`] from `config`.
    pub fn from_config(config: RenderConfig) -> Result<Self> {
        let fonts = FontBook::load(&config)?;
        let images = Arc::new(ImageFetcher::new(&config)?);
        Ok(Self::new(config, fonts, images))
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Resolve every element for `record` without loading or drawing anything.
    pub fn plan(&self, template: &Template, record: &Record) -> CardLayout {
        let elements = template
            .draw_order()
            .into_iter()
            .map(|element| self.plan_element(element, record))
            .collect();
        CardLayout {
            width: template.width,
            height: template.height,
            pixel_ratio: self.config.pixel_ratio,
            elements,
        }
    }

    fn plan_element(&self, element: &Element, record: &Record) -> ElementLayout {
        let frame = element.frame();
        let geometry = layout::resolve_geometry(element, record);

        let content = match element {
            Element::StaticText(_) | Element::DynamicText(_) => {
                let text = resolve_text(element, record);
                let lines = match element.text_style() {
                    Some(style) => text::layout_lines(&self.fonts.face(&style.font_family), &text, style, geometry),
                    None => Vec::new(),
                };
                ElementContent::Text { text, lines }
            }
            Element::StaticImage(_) => ElementContent::Image {
                src: resolve_image_source(element, record),
                fit: None,
                loaded: false,
            },
            Element::DynamicImage(_) => ElementContent::Image {
                src: apply_proxy(&resolve_image_source(element, record), self.config.image_proxy.as_deref()),
                fit: None,
                loaded: false,
            },
        };

        ElementLayout {
            id: frame.id.clone(),
            x: frame.x,
            y: frame.y,
            width: geometry.width,
            height: geometry.height,
            z_index: frame.z_index,
            opacity: frame.effective_opacity(),
            content,
        }
    }

    /// Render one card for `record`.
    ///
    /// Fails only when the template itself cannot produce an image (a
    /// non-positive or non-finite size). Per-element image failures are
    /// logged and the element is skipped.
    pub async fn render_one(&self, template: &Template, record: &Record) -> Result<CardImage> {
        if !(template.width.is_finite() && template.height.is_finite() && template.width > 0.0 && template.height > 0.0)
        {
            return Err(CardpressError::Render(format!(
                "cannot render a {}x{} card",
                template.width, template.height
            )));
        }

        let mut plan = self.plan(template, record);
        let images = self.load_images(&plan).await;

        let (width, height) = self.config.output_size(template.width, template.height);
        let mut canvas = Canvas::new(width, height);
        let ratio = self.config.pixel_ratio;

        for (element, (layout, image)) in template
            .draw_order()
            .into_iter()
            .zip(plan.elements.iter_mut().zip(images))
        {
            let geometry = layout.geometry();
            match (&mut layout.content, image) {
                (ElementContent::Text { lines, .. }, _) => {
                    if let Some(style) = element.text_style() {
                        let face = self.fonts.face(&style.font_family);
                        text::draw_lines(
                            &mut canvas,
                            &face,
                            lines,
                            style,
                            layout.x,
                            layout.y,
                            geometry,
                            ratio,
                            layout.opacity,
                        );
                    }
                }
                (ElementContent::Image { fit, loaded, .. }, Some(image)) => {
                    let placed = layout::fit(image.width() as f32, image.height() as f32, geometry.width, geometry.height);
                    canvas.draw_image(
                        &image,
                        (layout.x + placed.offset_x) * ratio,
                        (layout.y + placed.offset_y) * ratio,
                        placed.draw_width * ratio,
                        placed.draw_height * ratio,
                        layout.opacity,
                    );
                    *fit = Some(placed);
                    *loaded = true;
                }
                (ElementContent::Image { .. }, None) => {}
            }
        }

        Ok(CardImage {
            pixels: canvas.into_image(),
            layout: plan,
        })
    }

    /// Load the plan's images one after another; `None` where a load failed
    /// or the element is not an image.
    ///
    /// At most one fetch or decode per card is in flight, so a batch window
    /// of N cards has at most N.
    async fn load_images(&self, plan: &CardLayout) -> Vec<Option<Arc<DynamicImage>>> {
        let mut loaded = Vec::with_capacity(plan.elements.len());
        for layout in &plan.elements {
            let image = match layout.image_source() {
                None => None,
                Some("") => {
                    debug!("[render] image '{}' has no source", layout.id);
                    None
                }
                Some(src) => match self.images.load(src).await {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!("[render] skipping image '{}': {}", layout.id, e);
                        None
                    }
                },
            };
            loaded.push(image);
        }
        loaded
    }
}

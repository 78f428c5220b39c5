//! Font lookup and glyph rasterization.
//!
//! A [`FontBook`] maps family names to outline fonts loaded with ab_glyph
//! from a fonts directory. Families with no file resolve to the configured
//! default font, and failing that to the built-in Spleen 12x24 bitmap font
//! scaled to the requested size, so text always draws.
//!
//! Sizes are CSS font sizes: one em is `size` pixels tall, and each line of
//! text occupies exactly `size` pixels (a line height of 1).

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use image::Rgba;
use log::{debug, info, warn};
use spleen_font::{FONT_12X24, PSF2Font};
use std::collections::HashMap;
use std::path::Path;

use super::canvas::Canvas;
use crate::config::RenderConfig;
use crate::error::{CardpressError, Result};

const SPLEEN_WIDTH: usize = 12;
const SPLEEN_HEIGHT: usize = 24;

/// Normalise a family name or font file stem for lookup.
///
/// Lowercase, underscores read as spaces, and any style suffix after `-`
/// dropped: `"Lobster-Regular"` and `"lobster"` share a key.
pub fn family_key(name: &str) -> String {
    let base = name.split('-').next().unwrap_or(name);
    base.trim().to_lowercase().replace('_', " ")
}

/// Outline fonts by family, plus the fallback chain.
#[derive(Default, Clone)]
pub struct FontBook {
    faces: HashMap<String, FontArc>,
    default: Option<FontArc>,
}

impl FontBook {
    /// A font book with no outline fonts: everything renders with Spleen.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the fonts named by the render configuration.
    pub fn load(config: &RenderConfig) -> Result<Self> {
        let mut book = Self::empty();
        if let Some(dir) = &config.fonts_dir {
            book.load_dir(dir)?;
        }
        if let Some(path) = &config.default_font {
            book.default = Some(read_font(path)?);
            info!("[fonts] default font {}", path.display());
        }
        Ok(book)
    }

    /// Register every `.ttf` / `.otf` file in `dir`.
    ///
    /// Unreadable files are skipped with a warning; a missing directory is an error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"));
            if !is_font {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_font(&path) {
                Ok(font) => {
                    let key = family_key(stem);
                    debug!("[fonts] {} -> '{}'", path.display(), key);
                    // Regular (or unsuffixed) files own the family; other styles only fill gaps
                    let style = stem.split_once('-').map(|(_, s)| s.to_lowercase());
                    if matches!(style.as_deref(), None | Some("regular")) {
                        self.faces.insert(key, font);
                    } else {
                        self.faces.entry(key).or_insert(font);
                    }
                    loaded += 1;
                }
                Err(e) => warn!("[fonts] skipping {}: {}", path.display(), e),
            }
        }
        info!("[fonts] loaded {} font file(s) from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Register an outline font under a family name.
    pub fn insert(&mut self, family: &str, font: FontArc) {
        self.faces.insert(family_key(family), font);
    }

    /// Registered family keys, sorted.
    pub fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.faces.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a family to a drawable face.
    pub fn face(&self, family: &str) -> Face {
        self.faces
            .get(&family_key(family))
            .or(self.default.as_ref())
            .map(|f| Face::Outline(f.clone()))
            .unwrap_or(Face::Bitmap)
    }
}

fn read_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| CardpressError::Render(format!("invalid font {}: {}", path.display(), e)))
}

/// A resolved font ready to measure and draw.
#[derive(Clone)]
pub enum Face {
    Outline(FontArc),
    /// Spleen 12x24 scaled to the font size.
    Bitmap,
}

impl Face {
    pub fn is_bitmap(&self) -> bool {
        matches!(self, Face::Bitmap)
    }

    /// Advance width of `text` at `size`.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        match self {
            Face::Outline(font) => {
                let scaled = font.as_scaled(px_scale(font, size));
                let mut width = 0.0;
                let mut previous = None;
                for ch in text.chars() {
                    let id = scaled.glyph_id(ch);
                    if let Some(prev) = previous {
                        width += scaled.kern(prev, id);
                    }
                    width += scaled.h_advance(id);
                    previous = Some(id);
                }
                width
            }
            Face::Bitmap => text.chars().count() as f32 * bitmap_advance(size),
        }
    }

    /// Draw one line of text with its line box's top-left corner at (x, y).
    ///
    /// The glyphs are centred vertically in a line box `size` pixels tall.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_line(&self, canvas: &mut Canvas, text: &str, x: f32, y: f32, size: f32, color: Rgba<u8>, opacity: f32) {
        if size <= 0.0 || text.is_empty() {
            return;
        }
        match self {
            Face::Outline(font) => draw_outline(canvas, font, text, x, y, size, color, opacity),
            Face::Bitmap => draw_bitmap(canvas, text, x, y, size, color, opacity),
        }
    }
}

/// ab_glyph scales by ascent-to-descent height; CSS sizes are em based.
fn px_scale(font: &FontArc, size: f32) -> PxScale {
    let units_per_em = font.units_per_em().unwrap_or(1000.0);
    PxScale::from(size * font.height_unscaled() / units_per_em)
}

#[allow(clippy::too_many_arguments)]
fn draw_outline(canvas: &mut Canvas, font: &FontArc, text: &str, x: f32, y: f32, size: f32, color: Rgba<u8>, opacity: f32) {
    let scale = px_scale(font, size);
    let scaled = font.as_scaled(scale);
    let baseline = y + (size + scaled.ascent() + scaled.descent()) / 2.0;

    let mut caret = x;
    let mut previous = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, baseline));
        caret += scaled.h_advance(id);
        previous = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let cx = px as i64 + bounds.min.x as i64;
                let cy = py as i64 + bounds.min.y as i64;
                canvas.blend(cx, cy, color, coverage * opacity);
            });
        }
    }
}

fn bitmap_advance(size: f32) -> f32 {
    SPLEEN_WIDTH as f32 * size / SPLEEN_HEIGHT as f32
}

/// One Spleen glyph as on/off cells, row-major. Unknown characters get a box.
fn spleen_glyph(font: &mut PSF2Font, ch: char) -> Vec<bool> {
    let mut cells = vec![false; SPLEEN_WIDTH * SPLEEN_HEIGHT];
    let utf8 = ch.to_string();
    match font.glyph_for_utf8(utf8.as_bytes()) {
        Some(glyph) => {
            for (row_y, row) in glyph.enumerate() {
                for (col_x, on) in row.enumerate() {
                    if col_x < SPLEEN_WIDTH && row_y < SPLEEN_HEIGHT {
                        cells[row_y * SPLEEN_WIDTH + col_x] = on;
                    }
                }
            }
        }
        None => {
            for yy in 2..SPLEEN_HEIGHT - 2 {
                for xx in 1..SPLEEN_WIDTH - 1 {
                    let edge = yy == 2 || yy == SPLEEN_HEIGHT - 3 || xx == 1 || xx == SPLEEN_WIDTH - 2;
                    cells[yy * SPLEEN_WIDTH + xx] = edge;
                }
            }
        }
    }
    cells
}

fn draw_bitmap(canvas: &mut Canvas, text: &str, x: f32, y: f32, size: f32, color: Rgba<u8>, opacity: f32) {
    let Ok(mut font) = PSF2Font::new(FONT_12X24) else {
        warn!("[fonts] built-in bitmap font failed to load");
        return;
    };
    let k = size / SPLEEN_HEIGHT as f32;
    let advance = bitmap_advance(size);
    let out_w = (SPLEEN_WIDTH as f32 * k).ceil().max(1.0) as usize;
    let out_h = (SPLEEN_HEIGHT as f32 * k).ceil().max(1.0) as usize;

    for (i, ch) in text.chars().enumerate() {
        if ch == ' ' {
            continue;
        }
        let cells = spleen_glyph(&mut font, ch);
        let left = (x + i as f32 * advance).round() as i64;
        let top = y.round() as i64;
        // nearest-neighbour upscale of the 12x24 cell grid
        for dy in 0..out_h {
            let sy = ((dy as f32 / k) as usize).min(SPLEEN_HEIGHT - 1);
            for dx in 0..out_w {
                let sx = ((dx as f32 / k) as usize).min(SPLEEN_WIDTH - 1);
                if cells[sy * SPLEEN_WIDTH + sx] {
                    canvas.blend(left + dx as i64, top + dy as i64, color, opacity);
                }
            }
        }
    }
}

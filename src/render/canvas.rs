//! RGBA pixel canvas with source-over compositing.
//!
//! Colours are straight (non-premultiplied) alpha. Every draw takes an
//! opacity that multiplies the source alpha, which is how element opacity
//! is applied to both glyph coverage and image pixels.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Output surface for one card.
pub struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    /// A fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Composite `color` over the pixel at (x, y) with the given coverage.
    ///
    /// Out-of-bounds coordinates are ignored.
    pub fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        let alpha = (color[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
        *dst = source_over(*dst, color, alpha);
    }

    /// Draw `image` scaled into the pixel rectangle (x, y, width, height).
    ///
    /// Only the part of the rectangle that lands on the canvas is
    /// rasterized, so work is bounded by the canvas size whatever the
    /// requested rectangle.
    pub fn draw_image(&mut self, image: &DynamicImage, x: f32, y: f32, width: f32, height: f32, opacity: f32) {
        let target_w = width.round();
        let target_h = height.round();
        if !(target_w >= 1.0 && target_h >= 1.0) || opacity <= 0.0 {
            return;
        }
        let left = x.round() as i64;
        let top = y.round() as i64;
        let right = left.saturating_add(target_w as i64);
        let bottom = top.saturating_add(target_h as i64);

        let (x0, y0) = (left.max(0), top.max(0));
        let (x1, y1) = (right.min(self.width() as i64), bottom.min(self.height() as i64));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let source = image.to_rgba8();
        if (x0, y0, x1, y1) == (left, top, right, bottom) {
            let scaled = if source.width() as f32 == target_w && source.height() as f32 == target_h {
                source
            } else {
                imageops::resize(&source, target_w as u32, target_h as u32, FilterType::Triangle)
            };
            for (sx, sy, pixel) in scaled.enumerate_pixels() {
                self.blend(left + sx as i64, top + sy as i64, *pixel, opacity);
            }
            return;
        }

        // Clipped: sample the source for each visible destination pixel.
        let scale_x = source.width() as f32 / target_w;
        let scale_y = source.height() as f32 / target_h;
        for dy in y0..y1 {
            let v = ((dy - top) as f32 + 0.5) * scale_y - 0.5;
            for dx in x0..x1 {
                let u = ((dx - left) as f32 + 0.5) * scale_x - 0.5;
                self.blend(dx, dy, sample_bilinear(&source, u, v), opacity);
            }
        }
    }
}

/// Bilinear sample at source pixel coordinates, clamped to the edges.
fn sample_bilinear(image: &RgbaImage, u: f32, v: f32) -> Rgba<u8> {
    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    let (u, v) = (u.clamp(0.0, max_x), v.clamp(0.0, max_y));
    let (x0, y0) = (u.floor() as u32, v.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(max_x as u32), (y0 + 1).min(max_y as u32));
    let (fx, fy) = (u - x0 as f32, v - y0 as f32);

    let (a, b) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
    let (c, d) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));
    let channel = |i: usize| {
        let top = a[i] as f32 * (1.0 - fx) + b[i] as f32 * fx;
        let bottom = c[i] as f32 * (1.0 - fx) + d[i] as f32 * fx;
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    };
    Rgba([channel(0), channel(1), channel(2), channel(3)])
}

/// Straight-alpha source-over: `src` at effective alpha `alpha` onto `dst`.
fn source_over(dst: Rgba<u8>, src: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let s = src[i] as f32;
        let d = dst[i] as f32;
        ((s * alpha + d * dst_alpha * (1.0 - alpha)) / out_alpha).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_source_replaces() {
        let mut canvas = Canvas::new(2, 2);
        canvas.blend(1, 1, Rgba([10, 20, 30, 255]), 1.0);
        let img = canvas.into_image();
        assert_eq!(*img.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn half_coverage_over_white() {
        let mut canvas = Canvas::new(1, 1);
        canvas.blend(0, 0, Rgba([255, 255, 255, 255]), 1.0);
        canvas.blend(0, 0, Rgba([0, 0, 0, 255]), 0.5);
        let px = *canvas.into_image().get_pixel(0, 0);
        assert_eq!(px[3], 255);
        assert!((127..=128).contains(&px[0]));
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut canvas = Canvas::new(1, 1);
        canvas.blend(-1, 0, Rgba([255, 0, 0, 255]), 1.0);
        canvas.blend(0, 5, Rgba([255, 0, 0, 255]), 1.0);
        assert_eq!(canvas.into_image().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn image_is_scaled_into_rect() {
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255])));
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_image(&red, 0.0, 2.0, 10.0, 5.0, 1.0);
        let img = canvas.into_image();
        assert_eq!(*img.get_pixel(5, 4), Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(5, 0)[3], 0);
        assert_eq!(img.get_pixel(5, 7)[3], 0);
    }

    #[test]
    fn huge_rect_only_fills_the_canvas() {
        let mut source = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        source.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let image = DynamicImage::ImageRgba8(source);

        let mut canvas = Canvas::new(100, 100);
        canvas.draw_image(&image, 0.0, 0.0, 8000.0, 8000.0, 1.0);
        let img = canvas.into_image();
        // the canvas shows the top-left quarter of the red source pixel
        assert_eq!(*img.get_pixel(99, 99), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 0, 0, 255]));

        let mut canvas = Canvas::new(10, 10);
        canvas.draw_image(&image, -5.0, 0.0, f32::MAX, 1e30, 1.0);
        assert_eq!(canvas.into_image().get_pixel(9, 9)[3], 255);
    }

    #[test]
    fn rect_off_the_canvas_draws_nothing() {
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_image(&red, 20.0, 20.0, 5.0, 5.0, 1.0);
        canvas.draw_image(&red, 0.0, 0.0, f32::NAN, 5.0, 1.0);
        assert!(canvas.into_image().pixels().all(|p| p[3] == 0));
    }
}

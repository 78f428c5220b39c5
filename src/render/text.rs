//! Text box layout and drawing.
//!
//! Layout happens in template units so the plan reported to callers is
//! resolution independent; drawing scales by the pixel ratio.

use super::canvas::Canvas;
use super::color::parse_color;
use super::font::Face;
use crate::layout::{self, Geometry};
use crate::template::TextStyle;

/// Lines that fit in a text box, top aligned.
pub fn layout_lines(face: &Face, text: &str, style: &TextStyle, geometry: Geometry) -> Vec<String> {
    let size = style.font_size;
    let mut lines = layout::wrap_text(text, geometry.width, |s| face.measure(s, size));
    lines.truncate(layout::max_lines(geometry.height, size));
    lines
}

/// Draw pre-wrapped lines into the box whose top-left is (x, y) in template units.
#[allow(clippy::too_many_arguments)]
pub fn draw_lines(
    canvas: &mut Canvas,
    face: &Face,
    lines: &[String],
    style: &TextStyle,
    x: f32,
    y: f32,
    geometry: Geometry,
    pixel_ratio: f32,
    opacity: f32,
) {
    let color = parse_color(&style.color);
    let size = style.font_size;
    let px_size = size * pixel_ratio;

    for (i, line) in lines.iter().enumerate() {
        let width = face.measure(line, size);
        let dx = layout::line_offset(style.align, width, geometry.width);
        let line_x = (x + dx) * pixel_ratio;
        let line_y = (y + i as f32 * size) * pixel_ratio;
        face.draw_line(canvas, line, line_x, line_y, px_size, color, opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Align;
    use pretty_assertions::assert_eq;

    fn style(font_size: f32, align: Align) -> TextStyle {
        TextStyle {
            font_size,
            align,
            ..Default::default()
        }
    }

    #[test]
    fn overflowing_lines_are_dropped() {
        // bitmap advance at 24px is 12 per char
        let lines = layout_lines(
            &Face::Bitmap,
            "one two three four",
            &style(24.0, Align::Left),
            Geometry { width: 100.0, height: 50.0 },
        );
        assert_eq!(lines, vec!["one two", "three"]);
    }

    #[test]
    fn right_aligned_ink_hugs_the_right_edge() {
        let mut canvas = Canvas::new(100, 24);
        let st = style(24.0, Align::Right);
        let geometry = Geometry { width: 100.0, height: 24.0 };
        draw_lines(&mut canvas, &Face::Bitmap, &["ab".to_string()], &st, 0.0, 0.0, geometry, 1.0, 1.0);
        let img = canvas.into_image();
        let min_x = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p[3] > 0)
            .map(|(x, _, _)| x)
            .min()
            .unwrap();
        assert!(min_x >= 76, "ink starts at {}", min_x);
    }
}

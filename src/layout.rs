//! # Layout Resolver
//!
//! Geometry math shared by the renderer and anything that previews a card:
//!
//! - [`resolve_geometry`]: an element's effective box, with record-bound
//!   dimension overrides (`width_bind` / `height_bind`).
//! - [`fit`]: aspect-preserving containment of image content in a box.
//! - [`wrap_text`] / [`max_lines`] / [`line_offset`]: the line-breaking model
//!   used for text boxes.
//!
//! Everything here is pure and works in template units.

use serde::Serialize;
use serde_json::Value;

use crate::binding::lookup_value;
use crate::record::Record;
use crate::template::{Align, Element};

/// Effective size of an element's box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
}

/// Compute an element's effective width and height for `record`.
///
/// A dimension bind that resolves to a non-negative integer wins. Otherwise
/// text uses `maxWidth` / `maxHeight` when set and the base box when not;
/// images use the base box.
pub fn resolve_geometry(element: &Element, record: &Record) -> Geometry {
    let frame = element.frame();
    let (literal_width, literal_height) = match element.text_style() {
        Some(style) => (
            style.max_width.unwrap_or(frame.width),
            style.max_height.unwrap_or(frame.height),
        ),
        None => (frame.width, frame.height),
    };

    let bound = |bind: &Option<String>| {
        bind.as_deref()
            .filter(|b| !b.is_empty())
            .and_then(|b| lookup_value(record, b))
            .and_then(parse_int_bind)
    };

    Geometry {
        width: bound(&frame.width_bind).map_or(literal_width, |w| w as f32),
        height: bound(&frame.height_bind).map_or(literal_height, |h| h as f32),
    }
}

/// Parse a dimension bind the way `parseInt` reads a field.
///
/// Leading whitespace and an optional sign are accepted, then the longest
/// run of decimal digits; anything after is ignored (`"120px"` → 120).
/// Numbers truncate toward zero. Negative results are rejected.
pub fn parse_int_bind(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        },
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }?;
    (parsed >= 0).then_some(parsed)
}

fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Placement of image content inside its box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fit {
    pub draw_width: f32,
    pub draw_height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Fit {
    pub const EMPTY: Fit = Fit {
        draw_width: 0.0,
        draw_height: 0.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    pub fn is_empty(&self) -> bool {
        self.draw_width <= 0.0 || self.draw_height <= 0.0
    }
}

/// Contain `content` inside `box`, preserving aspect ratio.
///
/// Relatively wider content spans the full box width and is centred
/// vertically; anything else spans the full height and is centred
/// horizontally. Degenerate sizes produce [`Fit::EMPTY`].
pub fn fit(content_width: f32, content_height: f32, box_width: f32, box_height: f32) -> Fit {
    if !(content_width > 0.0 && content_height > 0.0 && box_width > 0.0 && box_height > 0.0) {
        return Fit::EMPTY;
    }
    let content_aspect = content_width / content_height;
    let box_aspect = box_width / box_height;

    if content_aspect > box_aspect {
        let draw_height = box_width / content_aspect;
        Fit {
            draw_width: box_width,
            draw_height,
            offset_x: 0.0,
            offset_y: (box_height - draw_height) / 2.0,
        }
    } else {
        let draw_width = box_height * content_aspect;
        Fit {
            draw_width,
            draw_height: box_height,
            offset_x: (box_width - draw_width) / 2.0,
            offset_y: 0.0,
        }
    }
}

/// Break text into lines no wider than `width`.
///
/// Explicit newlines always break. Within a paragraph words are packed
/// greedily; a word wider than the box on its own is split between
/// characters. `measure` returns the advance width of a string.
pub fn wrap_text(text: &str, width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        let mut current = String::new();

        for word in paragraph.split(' ') {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if measure(&candidate) <= width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if measure(word) <= width {
                current = word.to_string();
                continue;
            }

            for ch in word.chars() {
                let mut next = current.clone();
                next.push(ch);
                if !current.is_empty() && measure(&next) > width {
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                } else {
                    current = next;
                }
            }
        }
        lines.push(current);
    }

    lines
}

/// How many lines of `line_height` fit in a box of `height`.
///
/// The first line is always kept, even when it overflows.
pub fn max_lines(height: f32, line_height: f32) -> usize {
    if line_height <= 0.0 {
        return usize::MAX;
    }
    ((height / line_height).floor().max(1.0)) as usize
}

/// Horizontal offset of a line of `line_width` inside a box of `box_width`.
pub fn line_offset(align: Align, line_width: f32, box_width: f32) -> f32 {
    match align {
        Align::Left => 0.0,
        Align::Center => (box_width - line_width) / 2.0,
        Align::Right => box_width - line_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DynamicText, Frame, StaticImage, TextStyle};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn text_element(max_width: Option<f32>, width_bind: Option<&str>) -> Element {
        let mut frame = Frame::new("t", 0.0, 0.0, 200.0, 50.0);
        frame.width_bind = width_bind.map(String::from);
        frame.height_bind = Some("h".into());
        Element::DynamicText(DynamicText {
            frame,
            style: TextStyle {
                max_width,
                ..Default::default()
            },
            bind: Some("name".into()),
            static_text: None,
        })
    }

    #[test]
    fn two_to_one_into_square() {
        assert_eq!(
            fit(200.0, 100.0, 100.0, 100.0),
            Fit {
                draw_width: 100.0,
                draw_height: 50.0,
                offset_x: 0.0,
                offset_y: 25.0
            }
        );
    }

    #[test]
    fn tall_content_centres_horizontally() {
        let f = fit(100.0, 400.0, 200.0, 200.0);
        assert_eq!((f.draw_width, f.draw_height, f.offset_x, f.offset_y), (50.0, 200.0, 75.0, 0.0));
        // equal aspect fills the box exactly
        assert_eq!(fit(30.0, 30.0, 90.0, 90.0).draw_width, 90.0);
    }

    #[test]
    fn degenerate_fit_is_empty() {
        assert!(fit(0.0, 10.0, 10.0, 10.0).is_empty());
        assert!(fit(10.0, 10.0, 10.0, 0.0).is_empty());
    }

    #[test]
    fn text_width_prefers_bind_then_max_width() {
        let r = record(json!({"w": "120", "h": 30}));
        assert_eq!(resolve_geometry(&text_element(Some(150.0), Some("w")), &r).width, 120.0);
        assert_eq!(resolve_geometry(&text_element(Some(150.0), None), &r).width, 150.0);
        assert_eq!(resolve_geometry(&text_element(None, None), &r).width, 200.0);
        assert_eq!(resolve_geometry(&text_element(None, None), &r).height, 30.0);
    }

    #[test]
    fn unparsable_bind_falls_back_to_literal() {
        let r = record(json!({"w": "wide", "h": "-5"}));
        let g = resolve_geometry(&text_element(None, Some("w")), &r);
        assert_eq!(g, Geometry { width: 200.0, height: 50.0 });
        let missing = resolve_geometry(&text_element(None, Some("absent")), &record(json!({})));
        assert_eq!(missing.width, 200.0);
    }

    #[test]
    fn image_bind_overrides_box() {
        let mut frame = Frame::new("i", 0.0, 0.0, 400.0, 600.0);
        frame.height_bind = Some("tall".into());
        let el = Element::StaticImage(StaticImage {
            frame,
            src: "x.png".into(),
        });
        let g = resolve_geometry(&el, &record(json!({"tall": 720.9})));
        assert_eq!(g, Geometry { width: 400.0, height: 720.0 });
    }

    #[test]
    fn int_bind_parsing_reads_prefix() {
        assert_eq!(parse_int_bind(&json!("  120px")), Some(120));
        assert_eq!(parse_int_bind(&json!("+7")), Some(7));
        assert_eq!(parse_int_bind(&json!("px120")), None);
        assert_eq!(parse_int_bind(&json!("")), None);
        assert_eq!(parse_int_bind(&json!(-3)), None);
        assert_eq!(parse_int_bind(&json!(["1"])), None);
    }

    fn mono(s: &str) -> f32 {
        s.chars().count() as f32 * 10.0
    }

    #[test]
    fn wraps_words_greedily() {
        assert_eq!(wrap_text("the quick brown fox", 100.0, mono), vec!["the quick", "brown fox"]);
    }

    #[test]
    fn honours_newlines_and_breaks_long_words() {
        assert_eq!(wrap_text("ab\n\ncdefghijklmn", 50.0, mono), vec!["ab", "", "cdefg", "hijkl", "mn"]);
    }

    #[test]
    fn line_capacity_and_alignment() {
        assert_eq!(max_lines(50.0, 24.0), 2);
        assert_eq!(max_lines(10.0, 24.0), 1);
        assert_eq!(line_offset(Align::Center, 40.0, 100.0), 30.0);
        assert_eq!(line_offset(Align::Right, 40.0, 100.0), 60.0);
        assert_eq!(line_offset(Align::Left, 40.0, 100.0), 0.0);
    }
}

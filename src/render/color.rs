//! CSS-style colour parsing for text fills.
//!
//! Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`,
//! `rgba(r, g, b, a)` and a handful of named colours. Anything else is black.

use image::Rgba;

const NAMED: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("orange", [255, 165, 0]),
    ("purple", [128, 0, 128]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("silver", [192, 192, 192]),
    ("gold", [255, 215, 0]),
    ("brown", [165, 42, 42]),
    ("pink", [255, 192, 203]),
    ("navy", [0, 0, 128]),
    ("teal", [0, 128, 128]),
    ("maroon", [128, 0, 0]),
];

pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Parse a colour, falling back to opaque black.
pub fn parse_color(input: &str) -> Rgba<u8> {
    try_parse_color(input).unwrap_or(BLACK)
}

/// Parse a colour, `None` when it is not recognised.
pub fn try_parse_color(input: &str) -> Option<Rgba<u8>> {
    let s = input.trim().to_ascii_lowercase();
    if s == "transparent" {
        return Some(Rgba([0, 0, 0, 0]));
    }
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = s.strip_prefix("rgba(").or_else(|| s.strip_prefix("rgb(")) {
        return parse_functional(args.strip_suffix(')')?);
    }
    NAMED
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, [r, g, b])| Rgba([*r, *g, *b, 255]))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        4 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?])),
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

fn parse_functional(args: &str) -> Option<Rgba<u8>> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if !(parts.len() == 3 || parts.len() == 4) {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        let v = match s.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? * 2.55,
            None => s.parse::<f32>().ok()?,
        };
        Some(v.round().clamp(0.0, 255.0) as u8)
    };
    let alpha = match parts.get(3) {
        Some(a) => (a.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
        None => 255,
    };
    Some(Rgba([channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha]))
}

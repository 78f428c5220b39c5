//! Element variants of a card template.
//!
//! The four shapes share a [`Frame`] (id, position, base box, draw order) and
//! are discriminated by the JSON `type` tag:
//!
//! | Tag | Variant | Content |
//! |-----|---------|---------|
//! | `staticText` | [`Element::StaticText`] | literal `text` |
//! | `text` | [`Element::DynamicText`] | record field named by `bind` |
//! | `staticImage` | [`Element::StaticImage`] | literal `src` |
//! | `image` | [`Element::DynamicImage`] | record field named by `bind` |

use serde::{Deserialize, Serialize};

/// Horizontal text alignment inside the element box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Geometry and draw order shared by every element variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Unique within a template.
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Draw order; ties keep insertion order.
    #[serde(default)]
    pub z_index: f32,
    /// Element opacity in `[0, 1]`. `None` draws fully opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    /// Record field whose integer value overrides the width.
    #[serde(
        default,
        rename = "width_bind",
        skip_serializing_if = "Option::is_none"
    )]
    pub width_bind: Option<String>,
    /// Record field whose integer value overrides the height.
    #[serde(
        default,
        rename = "height_bind",
        skip_serializing_if = "Option::is_none"
    )]
    pub height_bind: Option<String>,
}

impl Frame {
    /// A frame at `(x, y)` with a `width` x `height` box.
    pub fn new(id: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            z_index: 0.0,
            opacity: None,
            width_bind: None,
            height_bind: None,
        }
    }

    /// Opacity clamped to `[0, 1]`, defaulting to opaque.
    pub fn effective_opacity(&self) -> f32 {
        self.opacity.unwrap_or(1.0).clamp(0.0, 1.0)
    }
}

/// Font and paragraph settings shared by both text variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size: f32,
    pub font_family: String,
    /// CSS colour (`#rgb`, `#rrggbb`, `rgb()`, `rgba()`, basic names).
    pub color: String,
    #[serde(default)]
    pub align: Align,
    /// Maximum bounding box width; overrides `width` for text layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f32>,
    /// Maximum bounding box height; overrides `height` for text layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f32>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            font_family: "Arial".into(),
            color: "#000000".into(),
            align: Align::Left,
            max_width: None,
            max_height: None,
        }
    }
}

/// Text whose content is fixed in the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticText {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(flatten)]
    pub style: TextStyle,
    pub text: String,
}

/// Text whose content comes from a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicText {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(flatten)]
    pub style: TextStyle,
    /// Record field name; an empty name counts as unbound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Raw string drawn when no binding is set.
    #[serde(
        default,
        rename = "staticText",
        skip_serializing_if = "Option::is_none"
    )]
    pub static_text: Option<String>,
}

/// Image whose source is fixed in the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticImage {
    #[serde(flatten)]
    pub frame: Frame,
    pub src: String,
}

/// Image whose source comes from a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicImage {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Literal source used when no binding is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// A positioned template element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Element {
    #[serde(rename = "staticText")]
    StaticText(StaticText),
    #[serde(rename = "text")]
    DynamicText(DynamicText),
    #[serde(rename = "staticImage")]
    StaticImage(StaticImage),
    #[serde(rename = "image")]
    DynamicImage(DynamicImage),
}

impl Element {
    pub fn frame(&self) -> &Frame {
        match self {
            Element::StaticText(e) => &e.frame,
            Element::DynamicText(e) => &e.frame,
            Element::StaticImage(e) => &e.frame,
            Element::DynamicImage(e) => &e.frame,
        }
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        match self {
            Element::StaticText(e) => &mut e.frame,
            Element::DynamicText(e) => &mut e.frame,
            Element::StaticImage(e) => &mut e.frame,
            Element::DynamicImage(e) => &mut e.frame,
        }
    }

    pub fn id(&self) -> &str {
        &self.frame().id
    }

    pub fn z_index(&self) -> f32 {
        self.frame().z_index
    }

    /// Text style for the text variants, `None` for images.
    pub fn text_style(&self) -> Option<&TextStyle> {
        match self {
            Element::StaticText(e) => Some(&e.style),
            Element::DynamicText(e) => Some(&e.style),
            Element::StaticImage(_) | Element::DynamicImage(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Element::StaticImage(_) | Element::DynamicImage(_))
    }

    /// The record field this element's content is bound to, if any.
    ///
    /// Empty names are treated as unbound.
    pub fn binding(&self) -> Option<&str> {
        let bind = match self {
            Element::DynamicText(e) => e.bind.as_deref(),
            Element::DynamicImage(e) => e.bind.as_deref(),
            Element::StaticText(_) | Element::StaticImage(_) => None,
        };
        bind.filter(|b| !b.is_empty())
    }

    /// Short label for editor listings: the bound field or a placeholder.
    pub fn label(&self) -> String {
        match self {
            Element::StaticText(e) => e.text.clone(),
            Element::DynamicText(_) => self.binding().unwrap_or("Unbound Text").to_string(),
            Element::StaticImage(_) => "Static Image".to_string(),
            Element::DynamicImage(_) => self.binding().unwrap_or("Unbound Image").to_string(),
        }
    }
}

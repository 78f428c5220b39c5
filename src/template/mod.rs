//! # Card Templates
//!
//! A [`Template`] is the reusable layout shared by every generated card: a
//! logical size plus an ordered list of [`Element`]s. A [`TemplateBundle`]
//! pairs it with the process rules and is the on-disk template file format:
//!
//! ```json
//! {
//!   "template": { "width": 600, "height": 825, "elements": [], "customFonts": [] },
//!   "processRules": []
//! }
//! ```
//!
//! Templates are treated as values. Editing code builds a modified copy and
//! swaps it in whole; nothing mutates a template that a render may be reading.

pub mod element;
pub mod fonts;

pub use element::{Align, DynamicImage, DynamicText, Element, Frame, StaticImage, StaticText, TextStyle};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CardpressError, Result};
use crate::rules::ProcessRule;

/// Smallest allowed card edge in logical units.
pub const MIN_CARD_EDGE: f32 = 50.0;

/// Named card-size presets offered by the editor.
pub const CARD_SIZES: &[CardSize] = &[
    CardSize { label: "600x825 Mini Deck", width: 600.0, height: 825.0 },
    CardSize { label: "750x1125 Bridge Deck/Us Game Deck", width: 750.0, height: 1125.0 },
    CardSize { label: "825x1125 Euro Poker Deck", width: 825.0, height: 1125.0 },
    CardSize { label: "900x1500 Tarot Deck", width: 900.0, height: 1500.0 },
];

/// A named card size preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CardSize {
    pub label: &'static str,
    pub width: f32,
    pub height: f32,
}

/// Look up a preset by label prefix (`"600x825"`) or full label, case-insensitive.
pub fn card_size_by_name(name: &str) -> Option<CardSize> {
    let name = name.trim().to_lowercase();
    CARD_SIZES
        .iter()
        .find(|s| {
            let label = s.label.to_lowercase();
            label == name || label.split(' ').next() == Some(name.as_str())
        })
        .copied()
}

/// Card layout definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Font families added by the user on top of the built-in list.
    #[serde(default)]
    pub custom_fonts: Vec<String>,
}

impl Default for Template {
    /// The blank "new project" template (750x1125).
    fn default() -> Self {
        Self {
            width: 750.0,
            height: 1125.0,
            elements: Vec::new(),
            custom_fonts: Vec::new(),
        }
    }
}

impl Template {
    /// Create an empty template of the given size.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Builder-style element append, used heavily by tests.
    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    /// Find an element by id.
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    /// Elements in draw order: ascending `zIndex`, ties in list order.
    pub fn draw_order(&self) -> Vec<&Element> {
        let mut ordered: Vec<&Element> = self.elements.iter().collect();
        // sort_by is stable, so equal zIndex keeps insertion order
        ordered.sort_by(|a, b| a.z_index().total_cmp(&b.z_index()));
        ordered
    }

    /// Check the template invariants: minimum size and unique element ids.
    pub fn validate(&self) -> Result<()> {
        if !(self.width >= MIN_CARD_EDGE && self.height >= MIN_CARD_EDGE) {
            return Err(CardpressError::Template(format!(
                "card size {}x{} is below the {}x{} minimum",
                self.width, self.height, MIN_CARD_EDGE, MIN_CARD_EDGE
            )));
        }
        let mut seen = HashSet::new();
        for el in &self.elements {
            if !seen.insert(el.id()) {
                return Err(CardpressError::Template(format!(
                    "duplicate element id '{}'",
                    el.id()
                )));
            }
        }
        Ok(())
    }
}

/// Template file format: a template plus its process rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBundle {
    pub template: Template,
    #[serde(default)]
    pub process_rules: Vec<ProcessRule>,
}

impl TemplateBundle {
    /// Parse and validate a bundle. Invalid JSON or a template that breaks
    /// its invariants is rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let bundle: TemplateBundle = serde_json::from_str(json)
            .map_err(|e| CardpressError::Template(format!("invalid template file: {}", e)))?;
        bundle.template.validate()?;
        Ok(bundle)
    }

    /// Pretty-printed JSON, the format written by "Export Template".
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Comparator;
    use pretty_assertions::assert_eq;

    fn text(id: &str, z: f32) -> Element {
        let mut frame = Frame::new(id, 0.0, 0.0, 100.0, 20.0);
        frame.z_index = z;
        Element::StaticText(StaticText {
            frame,
            style: TextStyle::default(),
            text: id.to_string(),
        })
    }

    #[test]
    fn draw_order_is_stable_for_ties() {
        let template = Template::new(600.0, 825.0)
            .with_element(text("a", 1.0))
            .with_element(text("b", 0.0))
            .with_element(text("c", 1.0))
            .with_element(text("d", -2.0))
            .with_element(text("e", 0.0));
        let ids: Vec<&str> = template.draw_order().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn validate_rejects_small_cards() {
        assert!(Template::new(49.0, 100.0).validate().is_err());
        assert!(Template::new(50.0, 50.0).validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let template = Template::new(100.0, 100.0)
            .with_element(text("x", 0.0))
            .with_element(text("x", 1.0));
        let err = template.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate element id 'x'"));
    }

    #[test]
    fn bundle_round_trip() {
        let bundle = TemplateBundle {
            template: Template::new(600.0, 825.0).with_element(text("a", 3.0)),
            process_rules: vec![ProcessRule {
                key: "hp".into(),
                comparator: Comparator::Gt,
                value: "50".into(),
                new_key: "tier".into(),
                content: "strong".into(),
            }],
        };
        let json = bundle.to_json().unwrap();
        assert_eq!(TemplateBundle::from_json(&json).unwrap(), bundle);
    }

    #[test]
    fn bundle_requires_template_key() {
        assert!(TemplateBundle::from_json(r#"{"processRules": []}"#).is_err());
        assert!(TemplateBundle::from_json("not json").is_err());
        let minimal = TemplateBundle::from_json(r#"{"template": {"width": 400, "height": 600}}"#).unwrap();
        assert!(minimal.template.elements.is_empty());
        assert!(minimal.process_rules.is_empty());
    }

    #[test]
    fn card_size_presets() {
        let mini = card_size_by_name("600x825").unwrap();
        assert_eq!((mini.width, mini.height), (600.0, 825.0));
        assert_eq!(card_size_by_name("900X1500 tarot deck").unwrap().height, 1500.0);
        assert!(card_size_by_name("1x1").is_none());
    }
}

//! # Data Binding Resolver
//!
//! Turns an element plus a record into the literal content to draw.
//!
//! - Bound element, field present: the field's value as text
//!   (see [`value_to_string`]).
//! - Bound element, field missing or `null`: the empty string.
//! - Unbound element: the element's own literal (`text`, `staticText`,
//!   `src`), or the empty string when it has none.
//!
//! These functions never fail.

use serde_json::Value;

use crate::record::{Record, value_to_string};
use crate::template::Element;

/// Resolve the text an element displays for `record`.
///
/// Image elements resolve to the empty string.
pub fn resolve_text(element: &Element, record: &Record) -> String {
    match element {
        Element::StaticText(t) => t.text.clone(),
        Element::DynamicText(t) => match element.binding() {
            Some(field) => lookup(record, field),
            None => t.static_text.clone().unwrap_or_default(),
        },
        Element::StaticImage(_) | Element::DynamicImage(_) => String::new(),
    }
}

/// Resolve the image source an element loads for `record`.
///
/// Text elements resolve to the empty string.
pub fn resolve_image_source(element: &Element, record: &Record) -> String {
    match element {
        Element::StaticImage(i) => i.src.clone(),
        Element::DynamicImage(i) => match element.binding() {
            Some(field) => lookup(record, field),
            None => i.src.clone().unwrap_or_default(),
        },
        Element::StaticText(_) | Element::DynamicText(_) => String::new(),
    }
}

/// Read a field as text; missing fields read as empty.
pub fn lookup(record: &Record, field: &str) -> String {
    record.get(field).map(value_to_string).unwrap_or_default()
}

/// Read a raw field value, if present and not `null`.
pub fn lookup_value<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

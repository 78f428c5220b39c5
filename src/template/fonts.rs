//! Font family names used by text elements.
//!
//! Custom families are added to a template from Google Fonts stylesheet URLs
//! (`https://fonts.googleapis.com/css2?family=Open+Sans:wght@400`). Only the
//! family name is recorded; the renderer resolves it against its font book.

use reqwest::Url;

/// Families the editor always offers.
pub const BASE_FONTS: &[&str] = &["Arial", "Times New Roman", "Courier New", "Georgia", "Verdana"];

/// Extract the family name from a Google Fonts URL.
///
/// Returns `None` when the URL does not parse or has no `family` parameter.
pub fn parse_google_font_name(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    let family = url
        .query_pairs()
        .find(|(key, _)| key == "family")
        .map(|(_, value)| value.into_owned())?;
    // query_pairs already decoded '+' to ' ' and percent escapes
    let name = family.split(':').next().unwrap_or("").trim().to_string();
    if name.is_empty() { None } else { Some(name) }
}

/// Every family selectable for a template: base fonts then custom ones.
pub fn available_fonts(custom: &[String]) -> Vec<String> {
    BASE_FONTS
        .iter()
        .map(|f| f.to_string())
        .chain(custom.iter().cloned())
        .collect()
}

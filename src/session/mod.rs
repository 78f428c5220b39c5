//! # Editing Session
//!
//! The state container behind the editor: the current template, the process
//! rules, the original records and the working records derived from them,
//! plus a bounded undo/redo history of template snapshots.
//!
//! Every mutation builds a new value, validates it, and only then swaps it
//! in. A failed operation leaves the session exactly as it was.
//!
//! - Template edits (elements, fonts, card size) push a snapshot onto the
//!   history. Undo and redo move through those snapshots.
//! - Rule and record edits recompute the working records from the originals.
//!
//! The session persists itself as one JSON blob under [`SESSION_KEY`]
//! through a [`KeyValueStore`]. Persistence is best-effort: failures are
//! logged and the in-memory session stays authoritative.

pub mod history;
pub mod store;

pub use history::{HISTORY_LIMIT, History};
pub use store::{FileStore, KeyValueStore, MemoryStore};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CardpressError, Result};
use crate::record::{self, Record, RecordFormat};
use crate::render::loader::encode_data_url;
use crate::rules::{ProcessRule, apply_rules};
use crate::template::fonts::parse_google_font_name;
use crate::template::{Element, Frame, MIN_CARD_EDGE, StaticImage, Template, TemplateBundle};

/// Store key for the persisted session.
pub const SESSION_KEY: &str = "card-editor-session";

/// Where and how big a dropped image lands.
const DROPPED_IMAGE_FRAME: (f32, f32, f32, f32) = (50.0, 50.0, 400.0, 600.0);

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub template: Template,
    #[serde(default)]
    pub process_rules: Vec<ProcessRule>,
    #[serde(default)]
    pub original_cards: Vec<Record>,
    #[serde(default)]
    pub sample_cards: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// What a dropped file turned into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DropOutcome {
    ImageAdded { id: String },
    RecordsImported { count: usize },
    TemplateImported,
}

/// The editing session.
#[derive(Debug, Clone)]
pub struct Session {
    template: Template,
    rules: Vec<ProcessRule>,
    original: Vec<Record>,
    working: Vec<Record>,
    history: History<Template>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A blank project.
    pub fn new() -> Self {
        let template = Template::default();
        Self {
            history: History::new(template.clone()),
            template,
            rules: Vec::new(),
            original: Vec::new(),
            working: Vec::new(),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn rules(&self) -> &[ProcessRule] {
        &self.rules
    }

    pub fn original_records(&self) -> &[Record] {
        &self.original
    }

    /// Records after process rules: what cards are rendered from.
    pub fn records(&self) -> &[Record] {
        &self.working
    }

    // ------------------------------------------------------------------
    // Template edits (history-tracked)
    // ------------------------------------------------------------------

    /// Validate `next`, make it current and push it onto the history.
    fn commit(&mut self, next: Template) -> Result<()> {
        next.validate()?;
        self.history.push(next.clone());
        self.template = next;
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.template
            .elements
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| CardpressError::NotFound(format!("element '{}'", id)))
    }

    pub fn add_element(&mut self, element: Element) -> Result<()> {
        let mut next = self.template.clone();
        next.elements.push(element);
        self.commit(next)
    }

    /// Shallow-merge a JSON object into an element.
    ///
    /// The merged value must still deserialize as an element (the `type` tag
    /// may change) and the template must stay valid.
    pub fn update_element(&mut self, id: &str, patch: &Value) -> Result<()> {
        let index = self.position(id)?;
        let Value::Object(changes) = patch else {
            return Err(CardpressError::Template("element update must be a JSON object".into()));
        };

        let mut merged = serde_json::to_value(&self.template.elements[index])?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
        }
        let updated: Element = serde_json::from_value(merged)
            .map_err(|e| CardpressError::Template(format!("invalid element update: {}", e)))?;

        let mut next = self.template.clone();
        next.elements[index] = updated;
        self.commit(next)
    }

    pub fn delete_element(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        let mut next = self.template.clone();
        next.elements.remove(index);
        self.commit(next)
    }

    pub fn set_card_size(&mut self, width: f32, height: f32) -> Result<()> {
        if !(width >= MIN_CARD_EDGE && height >= MIN_CARD_EDGE) {
            return Err(CardpressError::Template(format!(
                "card size must be at least {}x{}",
                MIN_CARD_EDGE, MIN_CARD_EDGE
            )));
        }
        let mut next = self.template.clone();
        next.width = width;
        next.height = height;
        self.commit(next)
    }

    /// Add a custom font family. Returns `false` if it was already present.
    pub fn add_custom_font(&mut self, family: &str) -> Result<bool> {
        let family = family.trim();
        if family.is_empty() {
            return Err(CardpressError::Template("font family name is empty".into()));
        }
        if self.template.custom_fonts.iter().any(|f| f == family) {
            return Ok(false);
        }
        let mut next = self.template.clone();
        next.custom_fonts.push(family.to_string());
        self.commit(next)?;
        Ok(true)
    }

    /// Add the family named by a Google Fonts stylesheet URL.
    pub fn add_font_from_url(&mut self, url: &str) -> Result<String> {
        let family = parse_google_font_name(url)
            .ok_or_else(|| CardpressError::Template(format!("not a Google Fonts URL: {}", url)))?;
        self.add_custom_font(&family)?;
        Ok(family)
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(previous) => {
                self.template = previous.clone();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(next) => {
                self.template = next.clone();
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Keep the current template as the only history entry.
    pub fn clear_history(&mut self) {
        self.history.reset(self.template.clone());
    }

    // ------------------------------------------------------------------
    // Rules and records
    // ------------------------------------------------------------------

    fn recompute(&mut self) {
        self.working = apply_rules(&self.original, &self.rules);
    }

    pub fn set_rules(&mut self, rules: Vec<ProcessRule>) {
        self.rules = rules;
        self.recompute();
    }

    pub fn add_rule(&mut self, rule: ProcessRule) {
        self.rules.push(rule);
        self.recompute();
    }

    pub fn update_rule(&mut self, index: usize, rule: ProcessRule) -> Result<()> {
        let slot = self
            .rules
            .get_mut(index)
            .ok_or_else(|| CardpressError::NotFound(format!("rule {}", index)))?;
        *slot = rule;
        self.recompute();
        Ok(())
    }

    pub fn remove_rule(&mut self, index: usize) -> Result<ProcessRule> {
        if index >= self.rules.len() {
            return Err(CardpressError::NotFound(format!("rule {}", index)));
        }
        let removed = self.rules.remove(index);
        self.recompute();
        Ok(removed)
    }

    /// Replace the original records.
    pub fn set_records(&mut self, original: Vec<Record>) {
        self.original = original;
        self.recompute();
    }

    /// Parse a `.json` or `.csv` record file and make it the original records.
    pub fn import_records(&mut self, file_name: &str, text: &str) -> Result<usize> {
        let records = record::parse_records_file(file_name, text)?;
        let count = records.len();
        self.set_records(records);
        info!("[session] imported {} record(s) from {}", count, file_name);
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Whole-project operations
    // ------------------------------------------------------------------

    /// Start over: blank 750x1125 template, no rules, no records, no history.
    pub fn new_project(&mut self) {
        *self = Self::new();
    }

    /// Replace the template and rules from a template file.
    ///
    /// Records are kept and re-derived under the new rules. History restarts
    /// at the imported template.
    pub fn import_template(&mut self, json: &str) -> Result<()> {
        let bundle = TemplateBundle::from_json(json)?;
        self.apply_bundle(bundle);
        Ok(())
    }

    fn apply_bundle(&mut self, bundle: TemplateBundle) {
        self.history.reset(bundle.template.clone());
        self.template = bundle.template;
        self.rules = bundle.process_rules;
        self.recompute();
    }

    pub fn bundle(&self) -> TemplateBundle {
        TemplateBundle {
            template: self.template.clone(),
            process_rules: self.rules.clone(),
        }
    }

    /// The template file for the current template and rules.
    pub fn export_template(&self) -> Result<String> {
        self.bundle().to_json()
    }

    /// Handle a dropped file.
    ///
    /// Images become a static image element. JSON arrays become records,
    /// JSON objects with a `template` key are imported as template files,
    /// and CSV files become records.
    pub fn ingest_drop(&mut self, file_name: &str, mime: Option<&str>, bytes: &[u8]) -> Result<DropOutcome> {
        let guessed = mime_guess::from_path(file_name).first();
        let mime = match mime.filter(|m| !m.is_empty() && *m != "application/octet-stream") {
            Some(m) => m.to_string(),
            None => guessed.map(|m| m.essence_str().to_string()).unwrap_or_default(),
        };

        if mime.starts_with("image/") {
            return self.drop_image(&mime, bytes);
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| CardpressError::Record(format!("{} is not a text file", file_name)))?;

        let format = RecordFormat::from_file_name(file_name).or(match mime.as_str() {
            "application/json" => Some(RecordFormat::Json),
            "text/csv" => Some(RecordFormat::Csv),
            _ => None,
        });

        match format {
            Some(RecordFormat::Json) => {
                let value: Value = serde_json::from_str(text)
                    .map_err(|e| CardpressError::Record(format!("invalid JSON in {}: {}", file_name, e)))?;
                if value.as_object().is_some_and(|map| map.contains_key("template")) {
                    let bundle: TemplateBundle = serde_json::from_value(value)
                        .map_err(|e| CardpressError::Template(format!("invalid template file: {}", e)))?;
                    bundle.template.validate()?;
                    self.apply_bundle(bundle);
                    Ok(DropOutcome::TemplateImported)
                } else {
                    let records = record::records_from_value(value)?;
                    let count = records.len();
                    self.set_records(records);
                    Ok(DropOutcome::RecordsImported { count })
                }
            }
            Some(RecordFormat::Csv) => {
                let records = record::parse_csv_records(text);
                let count = records.len();
                self.set_records(records);
                Ok(DropOutcome::RecordsImported { count })
            }
            None => Err(CardpressError::Record(format!(
                "unsupported file '{}' ({})",
                file_name,
                if mime.is_empty() { "unknown type" } else { mime.as_str() }
            ))),
        }
    }

    fn drop_image(&mut self, mime: &str, bytes: &[u8]) -> Result<DropOutcome> {
        image::load_from_memory(bytes)
            .map_err(|e| CardpressError::Image(format!("dropped image does not decode: {}", e)))?;

        let id = uuid::Uuid::new_v4().to_string();
        let (x, y, w, h) = DROPPED_IMAGE_FRAME;
        self.add_element(Element::StaticImage(StaticImage {
            frame: Frame::new(id.clone(), x, y, w, h),
            src: encode_data_url(mime, bytes),
        }))?;
        Ok(DropOutcome::ImageAdded { id })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            template: self.template.clone(),
            process_rules: self.rules.clone(),
            original_cards: self.original.clone(),
            sample_cards: self.working.clone(),
            saved_at: Some(Utc::now()),
        }
    }

    /// Rebuild a session from a snapshot. Working records are re-derived
    /// from the originals rather than trusted.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        snapshot.template.validate()?;
        let mut session = Self::new();
        session.history.reset(snapshot.template.clone());
        session.template = snapshot.template;
        session.rules = snapshot.process_rules;
        session.original = snapshot.original_cards;
        session.recompute();
        Ok(session)
    }

    /// Save to `store`. Returns whether the save succeeded.
    pub async fn persist(&self, store: &dyn KeyValueStore) -> bool {
        let saved = match serde_json::to_value(self.snapshot()) {
            Ok(value) => store.set(SESSION_KEY, value).await,
            Err(e) => Err(e.into()),
        };
        match saved {
            Ok(()) => true,
            Err(e) => {
                warn!("[session] could not persist session: {}", e);
                false
            }
        }
    }

    /// Load the saved session, or a blank one if there is none or it is unreadable.
    pub async fn restore(store: &dyn KeyValueStore) -> Self {
        let loaded = match store.get(SESSION_KEY).await {
            Ok(Some(value)) => serde_json::from_value::<SessionSnapshot>(value)
                .map_err(CardpressError::from)
                .and_then(Self::from_snapshot),
            Ok(None) => return Self::new(),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(session) => {
                info!(
                    "[session] restored {} element(s), {} record(s)",
                    session.template.elements.len(),
                    session.original.len()
                );
                session
            }
            Err(e) => {
                warn!("[session] ignoring saved session: {}", e);
                Self::new()
            }
        }
    }

    /// Remove the saved session from `store`.
    pub async fn forget(store: &dyn KeyValueStore) -> bool {
        match store.delete(SESSION_KEY).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[session] could not delete saved session: {}", e);
                false
            }
        }
    }
}

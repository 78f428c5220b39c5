//! # Cardpress - Game Card Template Renderer
//!
//! Cardpress turns a card template and a list of records into one image per
//! record. It provides:
//!
//! - **Templates**: positioned text and image elements, static or bound to a record field
//! - **Process rules**: ordered, conditional field derivation over the records
//! - **Rendering**: text wrapping, alignment and aspect-ratio fitting, rasterized to PNG
//! - **Batch export**: bounded-concurrency rendering packed into a ZIP archive
//! - **Editing sessions**: undo/redo history and persistence behind an HTTP API
//!
//! ## Quick Start
//!
//! ```no_run
//! use cardpress::{BatchRenderer, RenderConfig, RenderEngine, TemplateBundle, apply_rules, export, record};
//!
//! # async fn example() -> cardpress::Result<()> {
//! let bundle = TemplateBundle::from_json(&std::fs::read_to_string("card-template.json")?)?;
//! let original = record::parse_records_file("cards.csv", &std::fs::read_to_string("cards.csv")?)?;
//! let records = apply_rules(&original, &bundle.process_rules);
//!
//! let batch = BatchRenderer::new(RenderEngine::from_config(RenderConfig::default())?);
//! batch.set_inputs(bundle.template, records).await;
//! let cards = batch.render_all().await?;
//! std::fs::write("cards.zip", export::cards_zip(&cards)?)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Template, elements, card sizes, fonts |
//! | [`record`] | Record parsing (JSON, CSV) |
//! | [`binding`] | Element content from a record |
//! | [`rules`] | Process rules and the expression language |
//! | [`layout`] | Dimension binding, wrapping, image fitting |
//! | [`render`] | Rasterization to PNG |
//! | [`batch`] | Windowed batch rendering with a per-index cache |
//! | [`session`] | Editing session, history, persistence |
//! | [`export`] | ZIP export and file output |
//! | [`server`] | HTTP API |
//! | [`error`] | Error types |

pub mod batch;
pub mod binding;
pub mod config;
pub mod error;
pub mod export;
pub mod layout;
pub mod record;
pub mod render;
pub mod rules;
pub mod server;
pub mod session;
pub mod template;

// Re-exports for convenience
pub use batch::BatchRenderer;
pub use config::{RenderConfig, ServerConfig};
pub use error::{CardpressError, Result};
pub use record::Record;
pub use render::{CardImage, CardLayout, RenderEngine};
pub use rules::{Comparator, ProcessRule, apply_rules};
pub use session::Session;
pub use template::{Element, Template, TemplateBundle};

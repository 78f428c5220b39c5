//! # Cardpress CLI
//!
//! Command-line interface for rendering card decks from a template file and
//! a record file.
//!
//! ## Usage
//!
//! ```bash
//! # Render every card into a ZIP of PNGs
//! cardpress render --template card-template.json --records cards.csv --out cards.zip
//!
//! # Render a single card
//! cardpress preview --template card-template.json --records cards.json --index 2 --out card.png
//!
//! # Show the records after process rules
//! cardpress rules --template card-template.json --records cards.csv
//!
//! # Run the editor API
//! cardpress serve --listen 0.0.0.0:8080 --state-dir ./.cardpress
//! ```

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardpress::{
    BatchRenderer, CardpressError, RenderConfig, RenderEngine, ServerConfig, TemplateBundle,
    config::{DEFAULT_BATCH_WINDOW, DEFAULT_PIXEL_RATIO},
    export,
    record::{self, Record},
    render::{font::FontBook, loader::ImageFetcher},
    rules::apply_rules,
    server,
};

/// Cardpress - game card template renderer
#[derive(Parser, Debug)]
#[command(name = "cardpress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render every card to PNG and pack them into a ZIP archive
    Render {
        #[command(flatten)]
        deck: DeckArgs,

        /// Output archive
        #[arg(long, value_name = "FILE", default_value = export::ZIP_FILE_NAME)]
        out: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Render one card to a PNG file
    Preview {
        #[command(flatten)]
        deck: DeckArgs,

        /// Card index (0-based)
        #[arg(long, default_value = "0")]
        index: usize,

        /// Output PNG
        #[arg(long, value_name = "FILE", default_value = "card.png")]
        out: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Print the records after the template's process rules as JSON
    Rules {
        #[command(flatten)]
        deck: DeckArgs,
    },

    /// Start the HTTP editor API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Directory for the persisted editing session (in memory when omitted)
        #[arg(long, value_name = "DIR", env = "CARDPRESS_STATE_DIR")]
        state_dir: Option<PathBuf>,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug)]
struct DeckArgs {
    /// Template file (`card-template.json`)
    #[arg(long, value_name = "FILE")]
    template: PathBuf,

    /// Record file (`.json` array of objects or `.csv` with a header row)
    #[arg(long, value_name = "FILE")]
    records: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Output pixels per template unit
    #[arg(long, default_value_t = DEFAULT_PIXEL_RATIO)]
    pixel_ratio: f32,

    /// Cards rendered concurrently
    #[arg(long, default_value_t = DEFAULT_BATCH_WINDOW)]
    window: usize,

    /// Prefix for remote dynamic image sources
    #[arg(long, env = "CARDPRESS_IMAGE_PROXY")]
    image_proxy: Option<String>,

    /// Directory of .ttf/.otf files, one family per file
    #[arg(long, value_name = "DIR", env = "CARDPRESS_FONTS_DIR")]
    fonts_dir: Option<PathBuf>,

    /// Font for families without a file in the fonts directory
    #[arg(long, value_name = "FILE")]
    default_font: Option<PathBuf>,
}

impl RenderArgs {
    fn into_config(self) -> RenderConfig {
        RenderConfig {
            pixel_ratio: self.pixel_ratio,
            batch_window: self.window,
            image_proxy: self.image_proxy,
            fonts_dir: self.fonts_dir,
            default_font: self.default_font,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CardpressError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { deck, out, render } => {
            let (bundle, records) = load_deck(&deck).await?;
            let batch = deck_renderer(&deck, render.into_config())?;
            let count = records.len();
            batch.set_inputs(bundle.template, records).await;

            info!("Rendering {} cards...", count);
            let cards = batch.render_all().await?;
            let zip = export::cards_zip(&cards)?;
            export::write_file(&out, &zip).await?;
            println!("Saved {} cards to {}", cards.len(), out.display());
        }
        Commands::Preview {
            deck,
            index,
            out,
            render,
        } => {
            let (bundle, records) = load_deck(&deck).await?;
            let batch = deck_renderer(&deck, render.into_config())?;
            batch.set_inputs(bundle.template, records).await;

            let card = batch.render_index(index).await?;
            export::write_file(&out, &card.to_png()?).await?;
            println!(
                "Saved card {} ({}x{}) to {}",
                index + 1,
                card.width(),
                card.height(),
                out.display()
            );
        }
        Commands::Rules { deck } => {
            let (_, records) = load_deck(&deck).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Serve {
            listen,
            state_dir,
            render,
        } => {
            let config = ServerConfig {
                listen_addr: listen,
                state_dir,
            };
            server::serve(config, render.into_config()).await?;
        }
    }

    Ok(())
}

/// Read the template bundle and the records, with the process rules applied.
async fn load_deck(deck: &DeckArgs) -> Result<(TemplateBundle, Vec<Record>), CardpressError> {
    let template_json = tokio::fs::read_to_string(&deck.template).await?;
    let bundle = TemplateBundle::from_json(&template_json)?;

    let records_text = tokio::fs::read_to_string(&deck.records).await?;
    let file_name = deck
        .records
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let original = record::parse_records_file(&file_name, &records_text)?;
    let records = apply_rules(&original, &bundle.process_rules);

    info!(
        "Loaded {} elements, {} rules, {} records",
        bundle.template.elements.len(),
        bundle.process_rules.len(),
        records.len()
    );
    Ok((bundle, records))
}

/// Batch renderer whose relative image paths resolve next to the template.
fn deck_renderer(deck: &DeckArgs, config: RenderConfig) -> Result<BatchRenderer, CardpressError> {
    let fonts = FontBook::load(&config)?;
    let mut images = ImageFetcher::new(&config)?;
    if let Some(dir) = deck.template.parent().filter(|p| p != &Path::new("")) {
        images = images.with_base_dir(dir);
    }
    let engine = RenderEngine::new(config, fonts, Arc::new(images));
    Ok(BatchRenderer::new(engine))
}

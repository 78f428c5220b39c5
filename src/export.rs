//! Export of rendered cards and template files.
//!
//! Cards are packed into a ZIP archive with one PNG per record, named by
//! 1-based index (`card_1.png`, `card_2.png`, ...). PNG data is already
//! compressed, so entries are stored without further compression.

use std::io::{Cursor, Write};
use std::path::Path;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{CardpressError, Result};
use crate::render::CardImage;

/// File name of the exported archive.
pub const ZIP_FILE_NAME: &str = "cards.zip";

/// File name of the exported template.
pub const TEMPLATE_FILE_NAME: &str = "card-template.json";

/// Archive entry name for the card at `index` (0-based).
pub fn card_file_name(index: usize) -> String {
    format!("card_{}.png", index + 1)
}

/// Build a ZIP archive of already-encoded PNGs, in order.
pub fn zip_pngs(pngs: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions<'_, ()> = FileOptions::default().compression_method(CompressionMethod::Stored);

    for (i, png) in pngs.iter().enumerate() {
        zip.start_file(card_file_name(i), options)
            .map_err(|e| CardpressError::Export(format!("zip entry {}: {}", i + 1, e)))?;
        zip.write_all(png)?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| CardpressError::Export(format!("zip finalize failed: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Encode cards as PNGs and pack them into a ZIP archive.
pub fn cards_zip<C: AsRef<CardImage>>(cards: &[C]) -> Result<Vec<u8>> {
    let pngs = cards
        .iter()
        .map(|card| card.as_ref().to_png())
        .collect::<Result<Vec<_>>>()?;
    zip_pngs(&pngs)
}

/// Write bytes to `path`, creating parent directories as needed.
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

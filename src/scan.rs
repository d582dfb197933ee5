//! Extraction entry points.
//!
//! Preprocessing and OCR are CPU-bound and blocking, so the async entry
//! point moves the whole folder walk onto the blocking pool, the same way
//! a blocking rasteriser would be isolated from the Tokio workers.

use crate::config::ExtractionConfig;
use crate::error::NotesError;
use crate::output::ExtractionOutput;
use crate::pipeline::extract;
use crate::pipeline::ocr::OcrEngine;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Scan an image folder into an ordered line sequence.
///
/// # Returns
/// `Ok(ExtractionOutput)` even when some images failed (see
/// `output.stats.failed_images` and [`ExtractionOutput::summary`]) or the
/// folder held no images (see `output.warnings`).
///
/// # Errors
/// Only when the folder itself cannot be listed.
pub async fn scan_folder(
    folder: impl AsRef<Path>,
    engine: Arc<dyn OcrEngine>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NotesError> {
    let folder = folder.as_ref().to_path_buf();
    let config = config.clone();
    info!("Scanning folder: {}", folder.display());

    tokio::task::spawn_blocking(move || extract::extract_folder(&folder, engine.as_ref(), &config))
        .await
        .map_err(|e| NotesError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Synchronous wrapper around [`extract::extract_folder`] for callers
/// without a runtime.
pub fn scan_folder_blocking(
    folder: impl AsRef<Path>,
    engine: &dyn OcrEngine,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NotesError> {
    extract::extract_folder(folder.as_ref(), engine, config)
}

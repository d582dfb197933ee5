//! Result types returned by extraction and refinement.
//!
//! Everything here is `Serialize` so the CLI can emit a machine-readable
//! report with `--json`.

use crate::error::{ChunkError, ImageError};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Ordered recognised lines, one empty-string separator after each image.
///
/// Only [`LineSequence::push_image`] appends, so a separator is always
/// exactly the element following an image's block and never merged into
/// a content line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineSequence(Vec<String>);

impl LineSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one image's lines followed by its separator.
    pub fn push_image<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.0.extend(lines);
        self.0.push(String::new());
    }

    /// The raw document: lines joined with `\n`.
    pub fn raw_text(&self) -> String {
        self.0.join("\n")
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Deref for LineSequence {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

/// Outcome for one image, in sequencer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// 0-based position in natural order.
    pub index: usize,
    pub file_name: String,
    /// Lines contributed (excluding the separator). 0 on failure.
    pub line_count: usize,
    pub duration_ms: u64,
    pub error: Option<ImageError>,
}

/// Non-fatal conditions the caller should surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionWarning {
    /// The folder contained no file with a supported image extension.
    EmptyInput { folder: String },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionWarning::EmptyInput { folder } => {
                write!(f, "No image files found in '{folder}'")
            }
        }
    }
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Supported images found in the folder.
    pub total_images: usize,
    pub processed_images: usize,
    pub failed_images: usize,
    /// Images never attempted because the run was cancelled.
    pub skipped_images: usize,
    pub total_lines: usize,
    pub duration_ms: u64,
}

/// Everything one extraction run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub lines: LineSequence,
    pub images: Vec<ImageResult>,
    pub warnings: Vec<ExtractionWarning>,
    pub stats: ExtractionStats,
    /// True when a cancel flag stopped the run before the last image.
    pub cancelled: bool,
}

impl ExtractionOutput {
    /// The raw document (`lines` joined with `\n`).
    pub fn raw_text(&self) -> String {
        self.lines.raw_text()
    }

    /// Images that failed, in order.
    pub fn failures(&self) -> impl Iterator<Item = &ImageResult> {
        self.images.iter().filter(|r| r.error.is_some())
    }

    /// One-line partial-success summary, e.g. `"2 processed, 1 skipped of 3 images"`.
    pub fn summary(&self) -> String {
        let s = &self.stats;
        format!(
            "{} processed, {} skipped of {} images",
            s.processed_images,
            s.failed_images + s.skipped_images,
            s.total_images
        )
    }
}

/// Outcome for one chunk, in chunk order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    /// 0-based chunk index.
    pub index: usize,
    /// Estimated input tokens from the splitter.
    pub estimated_tokens: usize,
    /// Cleaned completion output; empty on failure.
    pub markdown: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<ChunkError>,
}

/// Counters for one refinement run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinementStats {
    pub total_chunks: usize,
    pub refined_chunks: usize,
    pub failed_chunks: usize,
    /// Chunks whose single paragraph exceeded the budget.
    pub oversized_chunks: usize,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub duration_ms: u64,
}

/// The refined document plus per-chunk detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinementOutput {
    /// Refined chunks joined by a blank line, in chunk order.
    pub markdown: String,
    pub chunks: Vec<ChunkResult>,
    pub stats: RefinementStats,
}

impl RefinementOutput {
    /// Indices of chunks missing from `markdown` (only non-empty under
    /// [`crate::config::ChunkFailurePolicy::Skip`]).
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| c.index)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.error.is_none())
    }
}

//! # edgequake-notes2md
//!
//! Turn folders of photographed or scanned handwritten/printed notes into
//! structured Markdown.
//!
//! ## Why this crate?
//!
//! Raw OCR output of lecture notes is a flat wall of lines: headings,
//! lists, and cited examples all look alike. This crate keeps the OCR pass
//! deterministic (natural filename order, fixed preprocessing, one line
//! sequence per folder) and then asks a language model to *restyle* the
//! text, never rewrite it, in token-budgeted chunks that are reassembled in
//! their original order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image folder
//!  │
//!  ├─ 1. Sequence    natural filename order (img2 before img10)
//!  ├─ 2. Preprocess  grayscale → non-local-means denoise → Otsu binarisation
//!  ├─ 3. OCR         tesseract (CPU-bound, spawn_blocking)
//!  ├─ 4. Extract     trimmed lines, one empty separator per image
//!  ├─ 5. Chunk       paragraph-aligned, ≤ 1800 cl100k tokens per chunk
//!  ├─ 6. Refine      format-only completion per chunk, temperature 0
//!  ├─ 7. Clean       strip decorative artefacts from each completion
//!  └─ 8. Export      ocr_notes / ai_notes via a document renderer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_notes2md::{
//!     refine, scan_folder, Cl100kEstimator, CompletionSettings, ExtractionConfig,
//!     OpenAiCompatibleClient, RefinementConfig, TesseractEngine,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OPENAI_BASE_URL + OPENAI_API_KEY, checked before any work starts
//!     let client = OpenAiCompatibleClient::new(CompletionSettings::from_env()?)?;
//!
//!     let scan = scan_folder(
//!         "notes/",
//!         Arc::new(TesseractEngine::default()),
//!         &ExtractionConfig::default(),
//!     )
//!     .await?;
//!     eprintln!("{}", scan.summary());
//!
//!     let refined = refine(
//!         &scan.raw_text(),
//!         &client,
//!         &Cl100kEstimator::new()?,
//!         &RefinementConfig::default(),
//!     )
//!     .await?;
//!     println!("{}", refined.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notes2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-notes2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod refine;
pub mod scan;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ChunkFailurePolicy, CompletionSettings, ExtractionConfig, ExtractionConfigBuilder,
    RefinementConfig, RefinementConfigBuilder,
};
pub use error::{ChunkError, CompletionError, ImageError, NotesError, OcrError};
pub use export::{write_ai_notes, write_notes, write_ocr_notes, AI_NOTES_STEM, OCR_NOTES_STEM};
pub use output::{
    ChunkResult, ExtractionOutput, ExtractionStats, ExtractionWarning, ImageResult, LineSequence,
    RefinementOutput, RefinementStats,
};
pub use pipeline::chunk::{split_into_chunks, Cl100kEstimator, TextChunk, TokenEstimator};
pub use pipeline::format::format_notes;
pub use pipeline::llm::{
    Backend, Completion, CompletionClient, CompletionRequest, OpenAiCompatibleClient,
    ProviderClient,
};
pub use pipeline::ocr::{OcrEngine, RecognitionMode, TesseractEngine};
pub use pipeline::postprocess::clean_completion;
pub use pipeline::preprocess::DenoiseParams;
pub use pipeline::render::{CommandRenderer, DocumentRenderer, MarkdownRenderer};
pub use pipeline::sequence::{natural_key, sort_naturally, ImageHandle};
pub use progress::{CancelFlag, NoopProgressCallback, NotesProgressCallback, ProgressCallback};
pub use refine::{refine, refine_sync};
pub use scan::{scan_folder, scan_folder_blocking};

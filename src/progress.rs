//! Progress callbacks and cooperative cancellation.
//!
//! Inject an [`Arc<dyn NotesProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] or
//! [`crate::config::RefinementConfigBuilder::progress_callback`] to receive
//! events as each image is recognised and each chunk is refined.
//!
//! OCR and completion calls cannot be interrupted once started. A
//! [`CancelFlag`] is therefore only observed *between* units: raising it
//! stops the pipeline from scheduling the next image or chunk.
//!
//! # Example
//!
//! ```rust
//! use edgequake_notes2md::{NotesProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl NotesProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, line_count: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{}: {} lines", index + 1, total, line_count);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called by the extraction and refinement pipelines as they process units.
///
/// All methods have default no-op implementations. Indices are 0-based
/// positions in sequencer order (images) or chunk order (chunks).
///
/// # Thread safety
///
/// With `RefinementConfig::concurrency > 1` the chunk callbacks may fire
/// out of order and from different tasks.
pub trait NotesProgressCallback: Send + Sync {
    /// Called once after the folder has been listed and filtered.
    fn on_scan_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called before an image is preprocessed.
    fn on_image_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when an image was recognised.
    fn on_image_complete(&self, index: usize, total: usize, line_count: usize) {
        let _ = (index, total, line_count);
    }

    /// Called when an image was skipped because it failed.
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every image was attempted (or cancellation stopped the run).
    fn on_scan_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }

    /// Called once after the text has been split.
    fn on_refine_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called just before the completion request for a chunk is sent.
    fn on_chunk_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a chunk was refined and cleaned.
    fn on_chunk_complete(&self, index: usize, total: usize, markdown_len: usize) {
        let _ = (index, total, markdown_len);
    }

    /// Called when a chunk failed after all retries.
    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after all chunks were attempted.
    fn on_refine_complete(&self, total_chunks: usize, success_count: usize) {
        let _ = (total_chunks, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl NotesProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the configs.
pub type ProgressCallback = Arc<dyn NotesProgressCallback>;

/// Shared, cloneable cancellation flag.
///
/// Cloning shares the underlying flag, so a signal handler can hold one
/// clone while the pipeline checks another.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that no further units be scheduled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

//! Error types for the edgequake-notes2md library.
//!
//! Two distinct error tiers reflect two distinct failure modes:
//!
//! * [`NotesError`] is **fatal**: the run cannot proceed at all (input
//!   folder missing, completion endpoint not configured, a chunk failed
//!   under the abort policy). Returned as `Err(NotesError)` from the
//!   top-level entry points.
//!
//! * [`ImageError`] / [`ChunkError`] are **non-fatal**: a single image or a
//!   single chunk failed but the rest of the batch is fine. Stored inside
//!   [`crate::output::ImageResult`] and [`crate::output::ChunkResult`] so
//!   callers can report partial success instead of losing the whole run.
//!
//! [`OcrError`] and [`CompletionError`] are what the two external
//! collaborators (OCR engine, completion service) hand back; the pipeline
//! folds them into the per-unit errors above.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-notes2md library.
///
/// Per-image and per-chunk failures use [`ImageError`] and [`ChunkError`]
/// and are stored next to the unit result rather than propagated here.
#[derive(Debug, Error)]
pub enum NotesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The image folder does not exist.
    #[error("Image folder not found: '{path}'\nCheck the path exists and is a directory.")]
    FolderNotFound { path: PathBuf },

    /// Process does not have read permission on the folder.
    #[error("Permission denied reading '{path}'\nTry: chmod +rx {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Listing the folder failed for another reason.
    #[error("Failed to list folder '{path}': {source}")]
    FolderReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Completion errors ─────────────────────────────────────────────────
    /// A required configuration value for the completion endpoint is absent.
    #[error("Missing configuration: {variable} is not set.\n{hint}")]
    MissingConfiguration { variable: String, hint: String },

    /// The named edgequake-llm provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The subword vocabulary used for token estimation failed to load.
    #[error("Token estimator unavailable: {0}")]
    TokenizerUnavailable(String),

    /// One or more chunks failed and the failure policy is `Abort`.
    #[error("Refinement aborted: chunk(s) {failed:?} of {total} failed.\nFirst error: {first_error}")]
    ChunkCompletionFailed {
        failed: Vec<usize>,
        total: usize,
        first_error: String,
    },

    /// The caller raised the cancel flag before every unit was processed.
    #[error("Cancelled after {completed}/{total} units")]
    Cancelled { completed: usize, total: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external document renderer failed.
    #[error("Rendering '{path}' failed: {detail}")]
    RenderFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Stored in [`crate::output::ImageResult`]; the extraction continues with
/// the next image.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The file could not be opened or decoded (missing, corrupt, unsupported).
    #[error("{file}: could not read image: {detail}")]
    ReadFailed { file: String, detail: String },

    /// The OCR engine failed on the preprocessed image.
    #[error("{file}: recognition failed: {detail}")]
    RecognitionFailed { file: String, detail: String },
}

/// A non-fatal error for a single chunk.
///
/// Stored in [`crate::output::ChunkResult`]. Whether it becomes fatal is
/// decided by [`crate::config::ChunkFailurePolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// Completion call failed after retries.
    #[error("Chunk {chunk}: completion failed after {retries} retries: {detail}")]
    CompletionFailed {
        chunk: usize,
        retries: u32,
        detail: String,
    },

    /// Completion call exceeded the per-chunk deadline on every attempt.
    #[error("Chunk {chunk}: completion timed out after {secs}s")]
    Timeout { chunk: usize, secs: u64 },
}

impl ChunkError {
    /// Index of the chunk this error belongs to.
    pub fn chunk(&self) -> usize {
        match self {
            ChunkError::CompletionFailed { chunk, .. } | ChunkError::Timeout { chunk, .. } => {
                *chunk
            }
        }
    }
}

/// Failure reported by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine executable could not be started.
    #[error("OCR engine '{program}' unavailable: {detail}")]
    EngineUnavailable { program: String, detail: String },

    /// The engine ran but exited unsuccessfully.
    #[error("OCR engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// Staging the image for the engine failed.
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the preprocessed image failed.
    #[error("OCR image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failure reported by a completion client for one request.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP 429 from the endpoint.
    #[error("Rate limit exceeded (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 401/403; retrying will not help.
    #[error("Authentication rejected: {detail}")]
    Auth { detail: String },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response parsed but carried no usable completion.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    /// Connection, TLS or body-decoding failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error surfaced by an edgequake-llm provider.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl CompletionError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CompletionError::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_completion_failed_lists_indices() {
        let e = NotesError::ChunkCompletionFailed {
            failed: vec![1, 4],
            total: 6,
            first_error: "HTTP 500".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("[1, 4]"), "got: {msg}");
        assert!(msg.contains("of 6"), "got: {msg}");
    }

    #[test]
    fn missing_configuration_names_variable() {
        let e = NotesError::MissingConfiguration {
            variable: "OPENAI_API_KEY".into(),
            hint: "export OPENAI_API_KEY=...".into(),
        };
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn image_error_display() {
        let e = ImageError::ReadFailed {
            file: "2.png".into(),
            detail: "corrupt".into(),
        };
        assert!(e.to_string().starts_with("2.png"));
    }

    #[test]
    fn chunk_error_index() {
        let e = ChunkError::Timeout { chunk: 3, secs: 60 };
        assert_eq!(e.chunk(), 3);
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn auth_errors_are_not_retried() {
        assert!(!CompletionError::Auth {
            detail: "bad key".into()
        }
        .is_retryable());
        assert!(CompletionError::RateLimited {
            retry_after_secs: None
        }
        .is_retryable());
    }
}

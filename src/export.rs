//! Write the two notes documents into an output directory.
//!
//! Naming is fixed: `ocr_notes.<ext>` for the raw (or rule-formatted)
//! text and `ai_notes.<ext>` for the refined document, where `<ext>` comes
//! from the renderer.

use crate::error::NotesError;
use crate::pipeline::render::DocumentRenderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// File stem of the OCR notes document.
pub const OCR_NOTES_STEM: &str = "ocr_notes";

/// File stem of the refined notes document.
pub const AI_NOTES_STEM: &str = "ai_notes";

/// Render `markdown` to `<dir>/<stem>.<ext>`, creating `dir` if needed.
///
/// Returns the path written.
pub async fn write_notes(
    dir: impl AsRef<Path>,
    stem: &str,
    markdown: &str,
    renderer: Arc<dyn DocumentRenderer>,
) -> Result<PathBuf, NotesError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| NotesError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let path = dir.join(format!("{}.{}", stem, renderer.extension()));
    let target = path.clone();
    let markdown = markdown.to_string();
    tokio::task::spawn_blocking(move || renderer.render(&markdown, &target))
        .await
        .map_err(|e| NotesError::Internal(format!("Render task panicked: {}", e)))??;

    info!("Saved {}", path.display());
    Ok(path)
}

/// Write `ocr_notes.<ext>`.
pub async fn write_ocr_notes(
    dir: impl AsRef<Path>,
    markdown: &str,
    renderer: Arc<dyn DocumentRenderer>,
) -> Result<PathBuf, NotesError> {
    write_notes(dir, OCR_NOTES_STEM, markdown, renderer).await
}

/// Write `ai_notes.<ext>`.
pub async fn write_ai_notes(
    dir: impl AsRef<Path>,
    markdown: &str,
    renderer: Arc<dyn DocumentRenderer>,
) -> Result<PathBuf, NotesError> {
    write_notes(dir, AI_NOTES_STEM, markdown, renderer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::MarkdownRenderer;

    #[tokio::test]
    async fn creates_directory_and_names_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("nested/out");
        let renderer: Arc<dyn DocumentRenderer> = Arc::new(MarkdownRenderer);

        let ocr = write_ocr_notes(&out, "raw\n", Arc::clone(&renderer)).await.unwrap();
        let ai = write_ai_notes(&out, "# AI\n", renderer).await.unwrap();

        assert_eq!(ocr, out.join("ocr_notes.md"));
        assert_eq!(ai, out.join("ai_notes.md"));
        assert_eq!(std::fs::read_to_string(ai).unwrap(), "# AI\n");
    }
}

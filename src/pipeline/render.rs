//! Output rendering: Markdown text → a document on disk.
//!
//! Notes are always produced as Markdown. A [`DocumentRenderer`] decides
//! what lands on disk: [`MarkdownRenderer`] writes the text itself,
//! [`CommandRenderer`] hands it to an external converter (pandoc by
//! default) to produce a styled, paginated PDF.
//!
//! Rendering is blocking; [`crate::export`] runs it in `spawn_blocking`.

use crate::error::NotesError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Turns Markdown into a file at a given path.
pub trait DocumentRenderer: Send + Sync {
    /// File extension (without the dot) of the documents this renderer writes.
    fn extension(&self) -> &str;

    fn render(&self, markdown: &str, path: &Path) -> Result<(), NotesError>;
}

/// Writes the Markdown unchanged.
///
/// The write is atomic (temp file in the same directory, then rename), so
/// a crash never leaves a half-written notes file behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn extension(&self) -> &str {
        "md"
    }

    fn render(&self, markdown: &str, path: &Path) -> Result<(), NotesError> {
        write_atomic(path, markdown.as_bytes())
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), NotesError> {
    let write_err = |source: std::io::Error| NotesError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Renders through an external converter program.
///
/// The program is invoked as `<program> [args...] <input.md> -o <output>`,
/// which matches pandoc's interface.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
    extension: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            extension: extension.into(),
        }
    }

    /// `pandoc` producing PDF.
    pub fn pandoc_pdf() -> Self {
        Self::new("pandoc", "pdf")
    }

    /// Extra arguments placed before the input path (e.g. `--pdf-engine=weasyprint`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl DocumentRenderer for CommandRenderer {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn render(&self, markdown: &str, path: &Path) -> Result<(), NotesError> {
        let render_err = |detail: String| NotesError::RenderFailed {
            path: path.to_path_buf(),
            detail,
        };

        let mut input = tempfile::Builder::new()
            .prefix("notes2md-")
            .suffix(".md")
            .tempfile()
            .map_err(|e| render_err(format!("Failed to stage Markdown: {}", e)))?;
        input
            .write_all(markdown.as_bytes())
            .map_err(|e| render_err(format!("Failed to stage Markdown: {}", e)))?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(input.path())
            .arg("-o")
            .arg(path)
            .output()
            .map_err(|e| {
                render_err(format!(
                    "could not start '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(render_err(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!("Rendered {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn markdown_renderer_writes_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ai_notes.md");
        MarkdownRenderer.render("# Notes\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Notes\n");
        // Overwrite in place
        MarkdownRenderer.render("# Again\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Again\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_parent_is_write_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no/such/dir/out.md");
        let err = MarkdownRenderer.render("x", &path).unwrap_err();
        assert!(matches!(err, NotesError::OutputWriteFailed { .. }));
    }

    #[test]
    fn missing_converter_is_render_error() {
        let dir = TempDir::new().unwrap();
        let renderer = CommandRenderer::new("/definitely/not/pandoc", "pdf");
        assert_eq!(renderer.extension(), "pdf");
        let err = renderer
            .render("# x", &dir.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, NotesError::RenderFailed { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn converter_receives_input_and_output_paths() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("notes.txt");
        // `cp <input> -o <out>` fails, so wrap with sh to mimic pandoc's argv.
        let renderer = CommandRenderer::new("sh", "txt")
            .with_args(["-c", "cp \"$0\" \"$2\""]);
        renderer.render("hello", &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello");
    }
}

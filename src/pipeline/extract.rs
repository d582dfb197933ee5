//! Extraction: image folder → ordered [`LineSequence`].
//!
//! ## Ordering
//!
//! Output order is the natural filename order and nothing else: directory
//! iteration order is discarded by the explicit sort, and images are
//! processed strictly one after another. Re-running on an unchanged folder
//! reproduces byte-identical output.
//!
//! ## Failure policy
//!
//! * Missing folder → fatal [`NotesError::FolderNotFound`].
//! * No supported images → empty result plus
//!   [`ExtractionWarning::EmptyInput`]; not an error.
//! * One image fails to decode or recognise → recorded in its
//!   [`ImageResult`], skipped, and the batch continues.

use crate::config::ExtractionConfig;
use crate::error::{ImageError, NotesError};
use crate::output::{ExtractionOutput, ExtractionStats, ExtractionWarning, ImageResult, LineSequence};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::preprocess;
use crate::pipeline::sequence::{sort_naturally, ImageHandle};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Image extensions accepted by the scanner (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Whether `path` has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// List, filter and naturally sort the images in `folder`.
///
/// # Errors
/// [`NotesError::FolderNotFound`], [`NotesError::PermissionDenied`] or
/// [`NotesError::FolderReadFailed`] when the folder cannot be listed.
pub fn discover_images(folder: &Path) -> Result<Vec<ImageHandle>, NotesError> {
    let entries = std::fs::read_dir(folder).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NotesError::FolderNotFound {
            path: folder.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => NotesError::PermissionDenied {
            path: folder.to_path_buf(),
        },
        _ => NotesError::FolderReadFailed {
            path: folder.to_path_buf(),
            source: e,
        },
    })?;

    let mut handles = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| NotesError::FolderReadFailed {
            path: folder.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_supported_image(&path) {
            handles.push(ImageHandle::new(path));
        }
    }

    sort_naturally(&mut handles);
    Ok(handles)
}

/// Split engine output into trimmed lines.
///
/// Breaks on every Unicode line boundary an OCR engine may emit (LF, CRLF,
/// CR, VT, FF, FS, GS, RS, NEL, LS, PS). A terminator at the very end does
/// not produce an extra empty line.
pub fn split_recognized_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.char_indices().find(|(_, c)| is_line_boundary(*c)) {
            Some((pos, c)) => {
                lines.push(rest[..pos].trim().to_string());
                let mut next = pos + c.len_utf8();
                if c == '\r' && rest[next..].starts_with('\n') {
                    next += 1;
                }
                rest = &rest[next..];
            }
            None => {
                lines.push(rest.trim().to_string());
                rest = "";
            }
        }
    }
    lines
}

fn is_line_boundary(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0B}'
            | '\u{0C}'
            | '\u{1C}'
            | '\u{1D}'
            | '\u{1E}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Recognise one image: preprocess, then hand to the engine.
fn recognize_image(
    handle: &ImageHandle,
    engine: &dyn OcrEngine,
    config: &ExtractionConfig,
) -> Result<Vec<String>, ImageError> {
    let binary = preprocess::preprocess_file(handle.path(), &config.denoise)?;
    let text = engine
        .recognize(&binary, &config.recognition)
        .map_err(|e| ImageError::RecognitionFailed {
            file: handle.file_name().to_string(),
            detail: e.to_string(),
        })?;
    Ok(split_recognized_lines(&text))
}

/// Extract the ordered line sequence from every supported image in `folder`.
///
/// Blocking: runs the preprocessor and the OCR engine inline, one image at
/// a time. Use [`crate::scan::scan_folder`] from async code.
pub fn extract_folder(
    folder: &Path,
    engine: &dyn OcrEngine,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NotesError> {
    let start = Instant::now();
    let handles = discover_images(folder)?;
    let total = handles.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total);
    }

    if handles.is_empty() {
        warn!("No image files found in: {}", folder.display());
        if let Some(ref cb) = config.progress_callback {
            cb.on_scan_complete(0, 0);
        }
        return Ok(ExtractionOutput {
            warnings: vec![ExtractionWarning::EmptyInput {
                folder: folder.display().to_string(),
            }],
            stats: ExtractionStats {
                duration_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            },
            ..Default::default()
        });
    }

    info!("Found {} images in '{}'", total, folder.display());
    debug!(
        "Image order: {:?}",
        handles.iter().map(ImageHandle::file_name).collect::<Vec<_>>()
    );

    let mut lines = LineSequence::new();
    let mut images = Vec::with_capacity(total);
    let mut cancelled = false;

    for (index, handle) in handles.iter().enumerate() {
        if config.is_cancelled() {
            warn!("Extraction cancelled before image {}/{}", index + 1, total);
            cancelled = true;
            break;
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_image_start(index, total, handle.file_name());
        }
        let image_start = Instant::now();
        let outcome = recognize_image(handle, engine, config);
        let duration_ms = image_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(image_lines) => {
                let line_count = image_lines.len();
                info!("Processed image: {} ({} lines)", handle.file_name(), line_count);
                lines.push_image(image_lines);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_complete(index, total, line_count);
                }
                images.push(ImageResult {
                    index,
                    file_name: handle.file_name().to_string(),
                    line_count,
                    duration_ms,
                    error: None,
                });
            }
            Err(e) => {
                warn!("Failed to process {}: {}", handle.file_name(), e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_error(index, total, &e.to_string());
                }
                images.push(ImageResult {
                    index,
                    file_name: handle.file_name().to_string(),
                    line_count: 0,
                    duration_ms,
                    error: Some(e),
                });
            }
        }
    }

    let processed = images.iter().filter(|r| r.error.is_none()).count();
    let failed = images.len() - processed;
    let stats = ExtractionStats {
        total_images: total,
        processed_images: processed,
        failed_images: failed,
        skipped_images: total - images.len(),
        total_lines: images.iter().map(|r| r.line_count).sum(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} images, {} lines, {}ms",
        processed, total, stats.total_lines, stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(total, processed);
    }

    Ok(ExtractionOutput {
        lines,
        images,
        warnings: Vec::new(),
        stats,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_supported_image(Path::new("a/1.PNG")));
        assert!(is_supported_image(Path::new("scan.Jpeg")));
        assert!(is_supported_image(Path::new("x.tiff")));
        assert!(!is_supported_image(Path::new("x.tif")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("png")));
    }

    #[test]
    fn split_lines_trims_and_handles_terminators() {
        assert_eq!(split_recognized_lines("Hello"), vec!["Hello"]);
        assert_eq!(split_recognized_lines("  a  \r\n b\n"), vec!["a", "b"]);
        assert_eq!(split_recognized_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(split_recognized_lines("Hello\n\u{0C}"), vec!["Hello", ""]);
        assert_eq!(split_recognized_lines("x\ry"), vec!["x", "y"]);
        assert!(split_recognized_lines("").is_empty());
    }

    #[test]
    fn missing_folder_is_fatal() {
        let err = discover_images(Path::new("/no/such/notes/folder")).unwrap_err();
        assert!(matches!(err, NotesError::FolderNotFound { .. }));
    }

    #[test]
    fn discovery_filters_and_orders() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["10.png", "2.JPG", "1.jpeg", "readme.txt", "3.gif"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("0.png")).unwrap();

        let names: Vec<String> = discover_images(dir.path())
            .unwrap()
            .iter()
            .map(|h| h.file_name().to_string())
            .collect();
        assert_eq!(names, vec!["1.jpeg", "2.JPG", "10.png"]);
    }
}

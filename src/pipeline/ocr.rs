//! OCR collaborator: binary image → raw recognised text.
//!
//! The pipeline only depends on the [`OcrEngine`] trait, so tests can inject
//! a stub and applications can plug in any engine. [`TesseractEngine`] is
//! the production implementation: it stages the image as a temporary PNG
//! and runs the `tesseract` executable, reading the text from stdout.
//!
//! Text comes back exactly as the engine produced it (multiple lines,
//! trailing form feeds, OCR noise); line splitting and trimming belong to
//! the extraction stage.

use crate::error::OcrError;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Recognition mode handed to the engine with every image.
///
/// Defaults mirror tesseract's `--oem 3 --psm 6`: best available engine,
/// page treated as a single uniform block of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionMode {
    /// Engine mode (`--oem`). Default: 3.
    pub engine_mode: u8,
    /// Page segmentation mode (`--psm`). Default: 6.
    pub page_segmentation: u8,
}

impl Default for RecognitionMode {
    fn default() -> Self {
        Self {
            engine_mode: 3,
            page_segmentation: 6,
        }
    }
}

/// An engine that turns a preprocessed image into text.
///
/// Calls are blocking and may be slow; the pipeline runs them off the async
/// executor.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &GrayImage, mode: &RecognitionMode) -> Result<String, OcrError>;
}

/// [`OcrEngine`] backed by the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    program: PathBuf,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `tesseract --version` to confirm the program can be started.
    ///
    /// Returns the first line of the version banner.
    pub fn probe(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| self.unavailable(e))?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn unavailable(&self, e: std::io::Error) -> OcrError {
        OcrError::EngineUnavailable {
            program: self.program.display().to_string(),
            detail: e.to_string(),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage, mode: &RecognitionMode) -> Result<String, OcrError> {
        let staged = tempfile::Builder::new()
            .prefix("notes2md-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(staged.path(), ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .arg(staged.path())
            .arg("stdout")
            .arg("--oem")
            .arg(mode.engine_mode.to_string())
            .arg("--psm")
            .arg(mode.page_segmentation.to_string())
            .output()
            .map_err(|e| self.unavailable(e))?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} bytes", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_single_block() {
        let mode = RecognitionMode::default();
        assert_eq!(mode.engine_mode, 3);
        assert_eq!(mode.page_segmentation, 6);
    }

    #[test]
    fn missing_program_is_unavailable() {
        let engine = TesseractEngine::new("/definitely/not/tesseract");
        let img = GrayImage::new(4, 4);
        let err = engine
            .recognize(&img, &RecognitionMode::default())
            .unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable { .. }), "got {err:?}");
        assert!(matches!(
            engine.probe(),
            Err(OcrError::EngineUnavailable { .. })
        ));
    }
}

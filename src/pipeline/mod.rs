//! Pipeline stages for notes-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap collaborators (OCR engine, completion client, renderer) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! sequence ──▶ preprocess ──▶ ocr ──▶ extract ──▶ chunk ──▶ llm ──▶ postprocess
//! (order)      (denoise+bin)  (text)  (lines)     (budget)  (model)  (cleanup)
//! ```
//!
//! 1. [`sequence`]   : natural filename order for the image folder
//! 2. [`preprocess`] : grayscale, non-local-means denoise, Otsu binarisation
//! 3. [`ocr`]        : recognise text; the tesseract CLI by default
//! 4. [`extract`]    : drive 1–3 over a folder into one ordered line sequence
//! 5. [`chunk`]      : token-budgeted, paragraph-aligned split
//! 6. [`llm`]        : completion call with retry/backoff; the only stage with
//!    network I/O
//! 7. [`postprocess`] : strip decorative model artefacts
//!
//! [`format`] is the rule-based alternative to steps 5–7 and [`render`]
//! writes the final document.

pub mod chunk;
pub mod extract;
pub mod format;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;
pub mod render;
pub mod sequence;

//! Token-budgeted, paragraph-aligned chunking.
//!
//! The completion service has a finite context, so long notes are sent in
//! chunks. A chunk is a maximal run of whole paragraphs (text separated by
//! a blank line) whose estimated token count fits the budget. Paragraphs
//! are never split, reordered, dropped or modified, so joining the chunks
//! with [`PARAGRAPH_SEPARATOR`] reproduces the input exactly.
//!
//! A single paragraph larger than the budget becomes a chunk on its own
//! and is flagged [`TextChunk::oversized`].

use crate::error::NotesError;
use serde::{Deserialize, Serialize};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{debug, warn};

/// Separator between paragraphs, and between chunks on reassembly.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Deterministic token counter.
///
/// The same text must always yield the same count within a run.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// [`TokenEstimator`] over the `cl100k_base` BPE vocabulary.
pub struct Cl100kEstimator {
    bpe: CoreBPE,
}

impl Cl100kEstimator {
    /// Load the vocabulary (bundled with the crate; no network access).
    pub fn new() -> Result<Self, NotesError> {
        let bpe = cl100k_base().map_err(|e| NotesError::TokenizerUnavailable(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenEstimator for Cl100kEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// One chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-based position in the document.
    pub index: usize,
    pub text: String,
    /// Sum of the paragraph estimates in this chunk.
    pub estimated_tokens: usize,
    /// Single paragraph whose estimate alone exceeds the budget.
    pub oversized: bool,
}

/// Partition `text` into chunks of at most `max_tokens` estimated tokens.
///
/// Empty input yields a single empty chunk, mirroring the single empty
/// paragraph it contains.
pub fn split_into_chunks(
    text: &str,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<TextChunk> {
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    let close = |paragraphs: &[&str], tokens: usize, chunks: &mut Vec<TextChunk>| {
        let oversized = tokens > max_tokens;
        let index = chunks.len();
        if oversized {
            warn!(
                "Chunk {}: single paragraph of ~{} tokens exceeds the {}-token budget; sent unsplit",
                index, tokens, max_tokens
            );
        }
        chunks.push(TextChunk {
            index,
            text: paragraphs.join(PARAGRAPH_SEPARATOR),
            estimated_tokens: tokens,
            oversized,
        });
    };

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let tokens = estimator.estimate(paragraph);
        if current_tokens + tokens > max_tokens && !current.is_empty() {
            close(&current, current_tokens, &mut chunks);
            current.clear();
            current_tokens = 0;
        }
        current.push(paragraph);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        close(&current, current_tokens, &mut chunks);
    }

    debug!(
        "Split {} bytes into {} chunks (budget {})",
        text.len(),
        chunks.len(),
        max_tokens
    );
    chunks
}

/// Reassemble chunk texts (or their refinements) in order.
pub fn join_chunks<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(PARAGRAPH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordEstimator;

    impl TokenEstimator for WordEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn groups_paragraphs_under_budget() {
        let text = format!("{}\n\n{}\n\n{}", words(3), words(4), words(5));
        let chunks = split_into_chunks(&text, 8, &WordEstimator);
        assert_eq!(
            texts(&chunks),
            vec![format!("{}\n\n{}", words(3), words(4)), words(5)]
        );
        assert_eq!(chunks[0].estimated_tokens, 7);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn round_trip_reconstructs_input() {
        let text = "Intro line\n\nsecond para\nwith two lines\n\n\n\nafter empties\n\nend\n";
        for budget in [1, 2, 3, 5, 100] {
            let chunks = split_into_chunks(text, budget, &WordEstimator);
            assert_eq!(join_chunks(&texts(&chunks)), text, "budget {budget}");
        }
    }

    #[test]
    fn every_chunk_fits_unless_oversized() {
        let text = (1..=12).map(words).collect::<Vec<_>>().join("\n\n");
        let chunks = split_into_chunks(&text, 10, &WordEstimator);
        for c in &chunks {
            if c.oversized {
                assert!(!c.text.contains(PARAGRAPH_SEPARATOR));
            } else {
                assert!(WordEstimator.estimate(&c.text) <= 10, "chunk {:?}", c);
            }
        }
    }

    #[test]
    fn oversized_paragraph_stands_alone() {
        let text = format!("{}\n\n{}\n\n{}", words(2), words(5000), words(3));
        let chunks = split_into_chunks(&text, 1800, &WordEstimator);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].oversized);
        assert_eq!(chunks[1].estimated_tokens, 5000);
        assert_eq!(chunks[1].text, words(5000));
        assert!(!chunks[0].oversized && !chunks[2].oversized);
    }

    #[test]
    fn leading_oversized_paragraph_creates_no_empty_chunk() {
        let text = format!("{}\n\n{}", words(50), words(1));
        let chunks = split_into_chunks(&text, 10, &WordEstimator);
        assert_eq!(texts(&chunks), vec![words(50), words(1)]);
    }

    #[test]
    fn empty_text_is_one_empty_chunk() {
        let chunks = split_into_chunks("", 10, &WordEstimator);
        assert_eq!(texts(&chunks), vec![""]);
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = (1..=20).map(words).collect::<Vec<_>>().join("\n\n");
        assert_eq!(
            split_into_chunks(&text, 25, &WordEstimator),
            split_into_chunks(&text, 25, &WordEstimator)
        );
    }

    #[test]
    fn cl100k_estimates_are_stable() {
        let est = Cl100kEstimator::new().expect("bundled vocabulary loads");
        let text = "Offer and acceptance form the basis of a contract.";
        let n = est.estimate(text);
        assert!(n > 0 && n < 20, "got {n}");
        assert_eq!(n, est.estimate(text));
        assert_eq!(est.estimate(""), 0);
    }
}

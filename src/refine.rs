//! Refinement entry points: raw text → structured Markdown.
//!
//! ## Ordering
//!
//! With `concurrency == 1` chunks are refined strictly one after another.
//! With more, chunks are dispatched through `buffer_unordered` and finish
//! in any order; results are re-sorted by chunk index before assembly, so
//! the document order never depends on completion order.
//!
//! ## Failure policy
//!
//! Decided once per run by [`ChunkFailurePolicy`]:
//! * `Abort` (default): any failed chunk fails the run with
//!   [`NotesError::ChunkCompletionFailed`] listing every failed index.
//! * `Skip`: failed chunks are left out of the document and reported via
//!   [`RefinementOutput::failed_chunks`].

use crate::config::{ChunkFailurePolicy, RefinementConfig};
use crate::error::NotesError;
use crate::output::{ChunkResult, RefinementOutput, RefinementStats};
use crate::pipeline::chunk::{split_into_chunks, TextChunk, TokenEstimator, PARAGRAPH_SEPARATOR};
use crate::pipeline::llm::{refine_chunk, CompletionClient};
use crate::prompts::REFINE_SYSTEM_PROMPT;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{info, warn};

/// Refine `text` into Markdown through `client`.
///
/// The client is constructed by the caller (once per process or per run)
/// and injected here; nothing is read from global state.
///
/// # Errors
/// * [`NotesError::ChunkCompletionFailed`] under the `Abort` policy.
/// * [`NotesError::Cancelled`] when the cancel flag is raised before every
///   chunk was dispatched.
pub async fn refine<C: CompletionClient>(
    text: &str,
    client: &C,
    estimator: &dyn TokenEstimator,
    config: &RefinementConfig,
) -> Result<RefinementOutput, NotesError> {
    let start = Instant::now();
    let chunks = split_into_chunks(text, config.max_chunk_tokens, estimator);
    let total = chunks.len();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(REFINE_SYSTEM_PROMPT);

    info!(
        "Refining {} bytes in {} chunks (budget {} tokens, concurrency {})",
        text.len(),
        total,
        config.max_chunk_tokens,
        config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_refine_start(total);
    }

    let mut results = if config.concurrency > 1 {
        process_concurrent(client, &chunks, system_prompt, config).await?
    } else {
        process_sequential(client, &chunks, system_prompt, config).await?
    };
    results.sort_by_key(|r| r.index);

    let failed: Vec<usize> = results
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.index)
        .collect();

    if !failed.is_empty() && config.failure_policy == ChunkFailurePolicy::Abort {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_default();
        if let Some(ref cb) = config.progress_callback {
            cb.on_refine_complete(total, total - failed.len());
        }
        return Err(NotesError::ChunkCompletionFailed {
            failed,
            total,
            first_error,
        });
    }
    for index in &failed {
        warn!("Chunk {} left out of the refined document", index);
    }

    let markdown = assemble(&results);
    let stats = RefinementStats {
        total_chunks: total,
        refined_chunks: total - failed.len(),
        failed_chunks: failed.len(),
        oversized_chunks: chunks.iter().filter(|c| c.oversized).count(),
        total_prompt_tokens: results.iter().map(|r| r.prompt_tokens).sum(),
        total_completion_tokens: results.iter().map(|r| r.completion_tokens).sum(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Refinement complete: {}/{} chunks, {} prompt / {} completion tokens, {}ms",
        stats.refined_chunks,
        total,
        stats.total_prompt_tokens,
        stats.total_completion_tokens,
        stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_refine_complete(total, stats.refined_chunks);
    }

    Ok(RefinementOutput {
        markdown,
        chunks: results,
        stats,
    })
}

/// Synchronous wrapper around [`refine`].
///
/// Creates a temporary tokio runtime internally.
pub fn refine_sync<C: CompletionClient>(
    text: &str,
    client: &C,
    estimator: &dyn TokenEstimator,
    config: &RefinementConfig,
) -> Result<RefinementOutput, NotesError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NotesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(refine(text, client, estimator, config))
}

/// Join refined chunks in order, one blank line apart, with a single
/// trailing newline. Empty chunks contribute nothing.
fn assemble(results: &[ChunkResult]) -> String {
    let parts: Vec<&str> = results
        .iter()
        .filter(|r| r.error.is_none() && !r.markdown.is_empty())
        .map(|r| r.markdown.as_str())
        .collect();
    let mut markdown = parts.join(PARAGRAPH_SEPARATOR);
    if !markdown.is_empty() {
        markdown.push('\n');
    }
    markdown
}

/// Refine chunks one at a time, in order.
///
/// Under `Abort`, stops at the first failed chunk.
async fn process_sequential<C: CompletionClient>(
    client: &C,
    chunks: &[TextChunk],
    system_prompt: &str,
    config: &RefinementConfig,
) -> Result<Vec<ChunkResult>, NotesError> {
    let total = chunks.len();
    let mut results = Vec::with_capacity(total);

    for chunk in chunks {
        if config.is_cancelled() {
            warn!("Refinement cancelled before chunk {}/{}", chunk.index + 1, total);
            return Err(NotesError::Cancelled {
                completed: results.len(),
                total,
            });
        }
        let result = run_chunk(client, chunk, total, system_prompt, config).await;
        let failed = result.error.is_some();
        results.push(result);
        if failed && config.failure_policy == ChunkFailurePolicy::Abort {
            break;
        }
    }
    Ok(results)
}

/// Refine up to `concurrency` chunks at once. Output is in completion order.
async fn process_concurrent<C: CompletionClient>(
    client: &C,
    chunks: &[TextChunk],
    system_prompt: &str,
    config: &RefinementConfig,
) -> Result<Vec<ChunkResult>, NotesError> {
    let total = chunks.len();
    let outcomes: Vec<Option<ChunkResult>> = stream::iter(chunks.iter().map(|chunk| async move {
        if config.is_cancelled() {
            return None;
        }
        Some(run_chunk(client, chunk, total, system_prompt, config).await)
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let completed = outcomes.iter().filter(|o| o.is_some()).count();
    if completed < total {
        warn!("Refinement cancelled after {}/{} chunks", completed, total);
        return Err(NotesError::Cancelled { completed, total });
    }
    Ok(outcomes.into_iter().flatten().collect())
}

async fn run_chunk<C: CompletionClient>(
    client: &C,
    chunk: &TextChunk,
    total: usize,
    system_prompt: &str,
    config: &RefinementConfig,
) -> ChunkResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_chunk_start(chunk.index, total);
    }
    let result = refine_chunk(client, chunk, system_prompt, config).await;
    if let Some(ref cb) = config.progress_callback {
        match result.error {
            None => cb.on_chunk_complete(chunk.index, total, result.markdown.len()),
            Some(ref e) => cb.on_chunk_error(chunk.index, total, &e.to_string()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChunkError, CompletionError};
    use crate::pipeline::llm::{Completion, CompletionRequest};
    use crate::progress::CancelFlag;

    struct WordEstimator;

    impl TokenEstimator for WordEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    struct Echo;

    impl CompletionClient for Echo {
        async fn complete(
            &self,
            request: &CompletionRequest<'_>,
        ) -> Result<Completion, CompletionError> {
            Ok(Completion {
                content: request.user.to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        }
    }

    fn result(index: usize, markdown: &str, error: Option<ChunkError>) -> ChunkResult {
        ChunkResult {
            index,
            estimated_tokens: 0,
            markdown: markdown.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error,
        }
    }

    #[test]
    fn assemble_skips_blank_and_failed() {
        let results = vec![
            result(0, "# A", None),
            result(1, "", None),
            result(
                2,
                "",
                Some(ChunkError::Timeout { chunk: 2, secs: 1 }),
            ),
            result(3, "B", None),
        ];
        assert_eq!(assemble(&results), "# A\n\nB\n");
        assert_eq!(assemble(&[]), "");
    }

    #[tokio::test]
    async fn echo_preserves_paragraphs() {
        let config = RefinementConfig::builder().max_chunk_tokens(3).build().unwrap();
        let out = refine("a b\n\nc d\n\ne", &Echo, &WordEstimator, &config)
            .await
            .unwrap();
        assert_eq!(out.stats.total_chunks, 2);
        assert_eq!(out.markdown, "a b\n\nc d\n\ne\n");
        assert_eq!(out.stats.total_prompt_tokens, 2);
    }

    #[tokio::test]
    async fn empty_text_yields_empty_document() {
        let out = refine("", &Echo, &WordEstimator, &RefinementConfig::default())
            .await
            .unwrap();
        assert_eq!(out.markdown, "");
        assert!(out.is_complete());
    }

    #[tokio::test]
    async fn raised_cancel_flag_stops_before_first_chunk() {
        let flag = CancelFlag::new();
        flag.cancel();
        let config = RefinementConfig::builder().cancel(flag).build().unwrap();
        let err = refine("x", &Echo, &WordEstimator, &config).await.unwrap_err();
        assert!(matches!(err, NotesError::Cancelled { completed: 0, total: 1 }));
    }

    #[test]
    fn sync_wrapper_runs_without_runtime() {
        let out = refine_sync("x", &Echo, &WordEstimator, &RefinementConfig::default()).unwrap();
        assert_eq!(out.markdown, "x\n");
    }
}

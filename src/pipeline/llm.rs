//! Completion interaction: send one chunk to the language model.
//!
//! The orchestrator only knows the [`CompletionClient`] trait. Two
//! production clients implement it:
//!
//! * [`OpenAiCompatibleClient`] talks to any OpenAI-shaped
//!   `/chat/completions` endpoint (OpenRouter, vLLM, LM Studio, OpenAI)
//!   using [`CompletionSettings`] loaded once per process.
//! * [`ProviderClient`] wraps an `edgequake_llm` provider, for users who
//!   already configure providers through that catalogue.
//!
//! [`Backend`] picks one at runtime so a binary can hold a single concrete
//! client type.
//!
//! ## Retry Strategy
//!
//! Rate limits and 5xx responses are transient. Each chunk is retried up to
//! `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`), each attempt bounded by
//! `api_timeout_secs`. Authentication failures stop immediately.

use crate::config::{CompletionSettings, RefinementConfig};
use crate::error::{ChunkError, CompletionError, NotesError};
use crate::output::ChunkResult;
use crate::pipeline::chunk::TextChunk;
use crate::pipeline::postprocess::clean_completion;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One system + user exchange.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw model output plus usage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A chat-completion service.
///
/// Implementations must be safe to call concurrently; the orchestrator may
/// have several chunks in flight.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> impl Future<Output = Result<Completion, CompletionError>> + Send;
}

// ── OpenAI-compatible endpoint ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: [ChatMessageBody<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// [`CompletionClient`] for an OpenAI-compatible HTTP endpoint.
///
/// Holds one pooled `reqwest::Client`; clone freely.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(settings: CompletionSettings) -> Result<Self, NotesError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| NotesError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: settings.completions_url(),
            http,
            api_key: settings.api_key,
            model: settings.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: [
                ChatMessageBody {
                    role: "system",
                    content: request.system,
                },
                ChatMessageBody {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(CompletionError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
        into_completion(parsed)
    }
}

fn status_error(status: StatusCode, body: String) -> CompletionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth { detail: body },
        _ => CompletionError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

fn into_completion(body: ChatResponseBody) -> Result<Completion, CompletionError> {
    let usage = body.usage.unwrap_or_default();
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no choices".into()))?;
    Ok(Completion {
        content,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    })
}

// ── edgequake-llm provider ──────────────────────────────────────────────────

/// [`CompletionClient`] over an `edgequake_llm` provider.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Create a provider by name (`openai`, `anthropic`, `ollama`, ...) and model.
    pub fn from_name(provider: &str, model: &str) -> Result<Self, NotesError> {
        let llm = ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
            NotesError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: format!(
                    "Check that the provider's API key is set.\nError: {}",
                    e
                ),
            }
        })?;
        Ok(Self::new(llm))
    }

    /// Auto-detect a provider from the environment.
    pub fn from_env() -> Result<Self, NotesError> {
        let (llm, _embedding) =
            ProviderFactory::from_env().map_err(|e| NotesError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\nError: {}",
                    e
                ),
            })?;
        Ok(Self::new(llm))
    }
}

impl CompletionClient for ProviderClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        let messages = vec![
            ChatMessage::system(request.system),
            ChatMessage::user(request.user),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CompletionError::Provider(e.to_string()))?;
        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as u64,
            completion_tokens: response.completion_tokens as u64,
        })
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// Runtime choice between the two production clients.
#[derive(Clone)]
pub enum Backend {
    OpenAiCompatible(OpenAiCompatibleClient),
    Provider(ProviderClient),
}

impl CompletionClient for Backend {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        match self {
            Backend::OpenAiCompatible(c) => c.complete(request).await,
            Backend::Provider(c) => c.complete(request).await,
        }
    }
}

// ── Per-chunk refinement ────────────────────────────────────────────────────

enum AttemptFailure {
    TimedOut,
    Failed(CompletionError),
}

/// Refine a single chunk: call the client with retries, then clean the output.
///
/// Never propagates the error; a failed chunk comes back with
/// [`ChunkResult::error`] set so the orchestrator can apply its failure
/// policy across the whole document.
///
/// A chunk that is empty or whitespace-only is returned as-is without a
/// completion call.
pub async fn refine_chunk<C: CompletionClient>(
    client: &C,
    chunk: &TextChunk,
    system_prompt: &str,
    config: &RefinementConfig,
) -> ChunkResult {
    let start = Instant::now();
    let mut result = ChunkResult {
        index: chunk.index,
        estimated_tokens: chunk.estimated_tokens,
        markdown: String::new(),
        prompt_tokens: 0,
        completion_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: None,
    };

    if chunk.text.trim().is_empty() {
        debug!("Chunk {}: blank, passed through", chunk.index);
        return result;
    }

    let request = CompletionRequest {
        system: system_prompt,
        user: &chunk.text,
        temperature: config.temperature,
        max_tokens: config.max_output_tokens,
    };
    let deadline = Duration::from_secs(config.api_timeout_secs);
    let mut last_failure: Option<AttemptFailure> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = retry_delay_ms(config.retry_backoff_ms, attempt, last_failure.as_ref());
            warn!(
                "Chunk {}: retry {}/{} after {}ms",
                chunk.index, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        result.retries = attempt;

        match timeout(deadline, client.complete(&request)).await {
            Ok(Ok(completion)) => {
                debug!(
                    "Chunk {}: {} prompt tokens, {} completion tokens, {:?}",
                    chunk.index,
                    completion.prompt_tokens,
                    completion.completion_tokens,
                    start.elapsed()
                );
                result.markdown = clean_completion(&completion.content);
                result.prompt_tokens = completion.prompt_tokens;
                result.completion_tokens = completion.completion_tokens;
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
            Ok(Err(e)) => {
                warn!("Chunk {}: attempt {} failed: {}", chunk.index, attempt + 1, e);
                let retryable = e.is_retryable();
                last_failure = Some(AttemptFailure::Failed(e));
                if !retryable {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Chunk {}: attempt {} timed out after {}s",
                    chunk.index,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_failure = Some(AttemptFailure::TimedOut);
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    result.error = Some(match last_failure {
        Some(AttemptFailure::TimedOut) => ChunkError::Timeout {
            chunk: chunk.index,
            secs: config.api_timeout_secs,
        },
        Some(AttemptFailure::Failed(e)) => ChunkError::CompletionFailed {
            chunk: chunk.index,
            retries: result.retries,
            detail: e.to_string(),
        },
        None => ChunkError::CompletionFailed {
            chunk: chunk.index,
            retries: result.retries,
            detail: "Unknown error".to_string(),
        },
    });
    result
}

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt-1)`, raised
/// to the server's `Retry-After` when rate limited. Saturates at `u64::MAX`.
fn retry_delay_ms(base_ms: u64, attempt: u32, last: Option<&AttemptFailure>) -> u64 {
    let backoff = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor));
    match last {
        Some(AttemptFailure::Failed(CompletionError::RateLimited {
            retry_after_secs: Some(secs),
        })) => backoff.max(secs.saturating_mul(1000)),
        _ => backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            index: 0,
            text: text.to_string(),
            estimated_tokens: 3,
            oversized: false,
        }
    }

    fn fast_config() -> RefinementConfig {
        RefinementConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    /// Fails `failures` times, then echoes the user content.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        auth: bool,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                auth: false,
            }
        }
    }

    impl CompletionClient for Flaky {
        async fn complete(
            &self,
            request: &CompletionRequest<'_>,
        ) -> Result<Completion, CompletionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.auth {
                return Err(CompletionError::Auth {
                    detail: "invalid key".into(),
                });
            }
            if n < self.failures {
                return Err(CompletionError::Http {
                    status: 503,
                    body: "busy".into(),
                });
            }
            Ok(Completion {
                content: format!("Here are the notes:\n\n{}", request.user),
                prompt_tokens: 10,
                completion_tokens: 5,
            })
        }
    }

    struct Stalled;

    impl CompletionClient for Stalled {
        async fn complete(&self, _: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
            sleep(Duration::from_secs(30)).await;
            Ok(Completion::default())
        }
    }

    #[tokio::test]
    async fn success_is_cleaned() {
        let client = Flaky::new(0);
        let r = refine_chunk(&client, &chunk("## Topic"), "sys", &fast_config()).await;
        assert!(r.error.is_none());
        assert_eq!(r.markdown, "## Topic");
        assert_eq!(r.prompt_tokens, 10);
        assert_eq!(r.retries, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let client = Flaky::new(2);
        let r = refine_chunk(&client, &chunk("text"), "sys", &fast_config()).await;
        assert!(r.error.is_none(), "{:?}", r.error);
        assert_eq!(r.retries, 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_record_error() {
        let client = Flaky::new(10);
        let r = refine_chunk(&client, &chunk("text"), "sys", &fast_config()).await;
        assert!(r.markdown.is_empty());
        match r.error {
            Some(ChunkError::CompletionFailed { retries, ref detail, .. }) => {
                assert_eq!(retries, 2);
                assert!(detail.contains("503"));
            }
            other => panic!("expected CompletionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let client = Flaky {
            auth: true,
            ..Flaky::new(0)
        };
        let r = refine_chunk(&client, &chunk("text"), "sys", &fast_config()).await;
        assert!(r.error.is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_chunk_skips_the_client() {
        let client = Flaky::new(0);
        let r = refine_chunk(&client, &chunk(" \n "), "sys", &fast_config()).await;
        assert!(r.error.is_none());
        assert!(r.markdown.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stalled_call_times_out() {
        let config = RefinementConfig::builder()
            .max_retries(0)
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let r = refine_chunk(&Stalled, &chunk("text"), "sys", &config).await;
        assert_eq!(r.error, Some(ChunkError::Timeout { chunk: 0, secs: 1 }));
    }

    #[test]
    fn retry_delay_doubles_and_saturates() {
        assert_eq!(retry_delay_ms(500, 1, None), 500);
        assert_eq!(retry_delay_ms(500, 3, None), 2000);
        assert_eq!(retry_delay_ms(500, 64, None), u64::MAX);
        assert_eq!(retry_delay_ms(u64::MAX / 2, 3, None), u64::MAX);
    }

    #[test]
    fn retry_after_raises_delay_without_overflow() {
        let limited = |secs| {
            AttemptFailure::Failed(CompletionError::RateLimited {
                retry_after_secs: Some(secs),
            })
        };
        assert_eq!(retry_delay_ms(500, 1, Some(&limited(3))), 3000);
        assert_eq!(retry_delay_ms(5000, 1, Some(&limited(1))), 5000);
        assert_eq!(retry_delay_ms(500, 1, Some(&limited(u64::MAX))), u64::MAX);
        assert_eq!(retry_delay_ms(500, 1, Some(&AttemptFailure::TimedOut)), 500);
    }

    #[test]
    fn response_parsing() {
        let body: ChatResponseBody = serde_json::from_str(
            r##"{"choices":[{"message":{"role":"assistant","content":"# Notes"}}],
                "usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"##,
        )
        .unwrap();
        let c = into_completion(body).unwrap();
        assert_eq!(c.content, "# Notes");
        assert_eq!((c.prompt_tokens, c.completion_tokens), (12, 3));
    }

    #[test]
    fn empty_choices_are_malformed() {
        let body: ChatResponseBody = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            into_completion(body),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            CompletionError::Auth { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x".into()),
            CompletionError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequestBody {
            model: "m",
            messages: [
                ChatMessageBody {
                    role: "system",
                    content: "s",
                },
                ChatMessageBody {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.0,
            max_tokens: 2048,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["max_tokens"], 2048);
    }
}

//! Configuration types for extraction and refinement.
//!
//! Extraction is controlled through [`ExtractionConfig`], refinement
//! through [`RefinementConfig`]; both are built via builders so callers set
//! only what they care about and rely on documented defaults for the rest.
//!
//! Endpoint credentials live apart from both, in [`CompletionSettings`]:
//! they are loaded once per process from the environment and handed to a
//! completion client, which is then injected into the refinement
//! orchestrator. Nothing in the library reads them from global state.

use crate::error::NotesError;
use crate::pipeline::ocr::RecognitionMode;
use crate::pipeline::preprocess::DenoiseParams;
use crate::progress::{CancelFlag, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default chunk budget, in estimated tokens.
pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 1800;

/// Default completion output ceiling, in tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 2048;

/// Default model for the OpenAI-compatible endpoint.
pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for scanning an image folder.
///
/// The preprocessing recipe and the recognition mode are fixed by default;
/// they are fields rather than constants so tests can shrink the denoise
/// window on large fixtures.
#[derive(Clone, Default)]
pub struct ExtractionConfig {
    /// Non-local-means parameters. Default: h = 30, 7×7 patch, 21×21 search.
    pub denoise: DenoiseParams,

    /// Mode handed to the OCR engine. Default: LSTM engine, single uniform block.
    pub recognition: RecognitionMode,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked between images.
    pub cancel: Option<CancelFlag>,
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("denoise", &self.denoise)
            .field("recognition", &self.recognition)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn NotesProgressCallback>"),
            )
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn denoise(mut self, params: DenoiseParams) -> Self {
        self.config.denoise = params;
        self
    }

    pub fn recognition(mut self, mode: RecognitionMode) -> Self {
        self.config.recognition = mode;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, NotesError> {
        let d = &self.config.denoise;
        if d.strength <= 0.0 {
            return Err(NotesError::InvalidConfig(format!(
                "Denoise strength must be > 0, got {}",
                d.strength
            )));
        }
        if d.search_radius < d.patch_radius {
            return Err(NotesError::InvalidConfig(format!(
                "Denoise search radius ({}) must be ≥ patch radius ({})",
                d.search_radius, d.patch_radius
            )));
        }
        Ok(self.config)
    }
}

// ── Refinement ───────────────────────────────────────────────────────────

/// What to do when a chunk still fails after all retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkFailurePolicy {
    /// Stop and return [`NotesError::ChunkCompletionFailed`] naming the
    /// failed chunk indices. No refined document is produced. (default)
    #[default]
    Abort,
    /// Leave the chunk out, keep going, and record its index in
    /// [`crate::output::RefinementOutput::failed_chunks`]. The refined
    /// document then has a content gap.
    Skip,
}

/// Configuration for refining raw text through the completion service.
#[derive(Clone)]
pub struct RefinementConfig {
    /// Chunk budget in estimated tokens. Default: 1800.
    pub max_chunk_tokens: usize,

    /// Sampling temperature. Default: 0.0 (deterministic decoding).
    pub temperature: f32,

    /// Output ceiling per completion call. Default: 2048.
    pub max_output_tokens: usize,

    /// Retries per chunk on a retryable failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Chunks in flight at once. Default: 1 (strictly sequential).
    ///
    /// Results are always reassembled in chunk order, never completion order.
    pub concurrency: usize,

    /// Behaviour on a chunk that exhausts its retries. Default: [`ChunkFailurePolicy::Abort`].
    pub failure_policy: ChunkFailurePolicy,

    /// Custom system instruction. If None, uses [`crate::prompts::REFINE_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Per-attempt deadline for one completion call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Optional per-chunk progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked between chunks.
    pub cancel: Option<CancelFlag>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            temperature: 0.0,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            max_retries: 2,
            retry_backoff_ms: 500,
            concurrency: 1,
            failure_policy: ChunkFailurePolicy::default(),
            system_prompt: None,
            api_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for RefinementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefinementConfig")
            .field("max_chunk_tokens", &self.max_chunk_tokens)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn NotesProgressCallback>"),
            )
            .finish()
    }
}

impl RefinementConfig {
    pub fn builder() -> RefinementConfigBuilder {
        RefinementConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Builder for [`RefinementConfig`].
#[derive(Debug)]
pub struct RefinementConfigBuilder {
    config: RefinementConfig,
}

impl RefinementConfigBuilder {
    pub fn max_chunk_tokens(mut self, n: usize) -> Self {
        self.config.max_chunk_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: ChunkFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RefinementConfig, NotesError> {
        let c = &self.config;
        if c.max_chunk_tokens == 0 {
            return Err(NotesError::InvalidConfig(
                "Chunk budget must be ≥ 1 token".into(),
            ));
        }
        if c.max_output_tokens == 0 {
            return Err(NotesError::InvalidConfig(
                "Max output tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(NotesError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Completion endpoint ──────────────────────────────────────────────────

/// Environment variable holding the endpoint base URL.
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
/// Environment variable holding the bearer credential.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the model ID.
pub const ENV_MODEL: &str = "NOTES2MD_MODEL";

/// Endpoint, credential and model for an OpenAI-compatible chat-completion API.
///
/// Construct once per process (normally via [`CompletionSettings::from_env`])
/// and pass to [`crate::pipeline::llm::OpenAiCompatibleClient::new`].
#[derive(Clone)]
pub struct CompletionSettings {
    /// Base URL up to and excluding `/chat/completions`,
    /// e.g. `https://openrouter.ai/api/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Whole-request HTTP timeout. Default: 120.
    pub request_timeout_secs: u64,
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl CompletionSettings {
    /// Load settings from the process environment.
    ///
    /// # Errors
    /// [`NotesError::MissingConfiguration`] if `OPENAI_BASE_URL` or
    /// `OPENAI_API_KEY` is unset or empty.
    pub fn from_env() -> Result<Self, NotesError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotesError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get(ENV_BASE_URL).ok_or_else(|| NotesError::MissingConfiguration {
            variable: ENV_BASE_URL.to_string(),
            hint: format!("Set it to an OpenAI-compatible endpoint, e.g. export {ENV_BASE_URL}=https://openrouter.ai/api/v1"),
        })?;
        let api_key = get(ENV_API_KEY).ok_or_else(|| NotesError::MissingConfiguration {
            variable: ENV_API_KEY.to_string(),
            hint: format!("export {ENV_API_KEY}=sk-..."),
        })?;
        let model = get(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            base_url,
            api_key,
            model,
            request_timeout_secs: 120,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn refinement_defaults() {
        let c = RefinementConfig::default();
        assert_eq!(c.max_chunk_tokens, 1800);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_output_tokens, 2048);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.failure_policy, ChunkFailurePolicy::Abort);
    }

    #[test]
    fn builder_rejects_zero_budget() {
        let err = RefinementConfig::builder().max_chunk_tokens(0).build();
        assert!(matches!(err, Err(NotesError::InvalidConfig(_))));
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = RefinementConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn extraction_builder_rejects_bad_denoise() {
        let params = DenoiseParams {
            strength: 0.0,
            ..DenoiseParams::default()
        };
        let err = ExtractionConfig::builder().denoise(params).build();
        assert!(matches!(err, Err(NotesError::InvalidConfig(_))));
    }

    #[test]
    fn settings_from_lookup() {
        let s = CompletionSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://openrouter.ai/api/v1/"),
            (ENV_API_KEY, "sk-test"),
        ]))
        .unwrap();
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(
            s.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn settings_missing_key_is_fatal() {
        let err = CompletionSettings::from_lookup(lookup(&[(ENV_BASE_URL, "http://x")]));
        match err {
            Err(NotesError::MissingConfiguration { variable, .. }) => {
                assert_eq!(variable, ENV_API_KEY)
            }
            other => panic!("expected MissingConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn settings_empty_base_url_is_missing() {
        let err = CompletionSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "  "),
            (ENV_API_KEY, "sk"),
        ]));
        assert!(matches!(
            err,
            Err(NotesError::MissingConfiguration { ref variable, .. }) if variable == ENV_BASE_URL
        ));
    }

    #[test]
    fn settings_debug_redacts_key() {
        let s = CompletionSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://x"),
            (ENV_API_KEY, "sk-secret"),
        ]))
        .unwrap();
        assert!(!format!("{s:?}").contains("sk-secret"));
    }
}

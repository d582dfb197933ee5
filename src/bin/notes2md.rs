//! CLI binary for edgequake-notes2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `RefinementConfig`, wires up the collaborators and
//! writes the results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_notes2md::config::{DEFAULT_MODEL, ENV_API_KEY, ENV_BASE_URL};
use edgequake_notes2md::{
    format_notes, refine, scan_folder, write_ai_notes, write_ocr_notes, Backend, CancelFlag,
    ChunkFailurePolicy, Cl100kEstimator, CommandRenderer, CompletionSettings, DocumentRenderer,
    ExtractionConfig, ExtractionOutput, MarkdownRenderer, NotesProgressCallback, OcrEngine,
    OpenAiCompatibleClient, ProgressCallback, ProviderClient, RefinementConfig, RefinementOutput,
    TesseractEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar reused for the scan phase and the
/// refine phase, with a log line per image or chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, prefix: &'static str, unit: &str, total: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.errors.store(0, Ordering::SeqCst);
    }

    fn log_error(&self, what: &str, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {} {:>3}/{:<3}  {}",
            red("✗"),
            what,
            index + 1,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn finish(&self, unit: &str, total: usize, success: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success);
        if failed == 0 {
            eprintln!("{} {} {unit} done", green("✔"), bold(&success.to_string()));
        } else {
            eprintln!(
                "{} {}/{} {unit} done  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

impl NotesProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_images: usize) {
        self.activate_bar("Scanning", "images", total_images);
    }

    fn on_image_start(&self, _index: usize, _total: usize, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, line_count: usize) {
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{line_count:>4} lines")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        self.log_error("Image", index, total, error);
    }

    fn on_scan_complete(&self, total: usize, success: usize) {
        self.finish("images", total, success);
    }

    fn on_refine_start(&self, total_chunks: usize) {
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.activate_bar("Refining", "chunks", total_chunks);
    }

    fn on_chunk_complete(&self, index: usize, total: usize, markdown_len: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{markdown_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        self.log_error("Chunk", index, total, error);
    }

    fn on_refine_complete(&self, total: usize, success: usize) {
        self.finish("chunks", total, success);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR only, print the raw notes
  notes2md lecture-photos/

  # OCR + model refinement, write ocr_notes.md and ai_notes.md
  notes2md lecture-photos/ --refine -o out/

  # Render PDFs through pandoc instead of Markdown files
  notes2md lecture-photos/ --refine -o out/ --pdf-command pandoc

  # No model: rule-based formatting of the OCR text
  notes2md lecture-photos/ --rule-format -o out/

  # Keep going when a chunk fails; report its index
  notes2md lecture-photos/ --refine --skip-failed-chunks

  # Use an edgequake-llm provider instead of a raw endpoint
  notes2md lecture-photos/ --refine --provider anthropic --model claude-3-5-haiku-latest

ENVIRONMENT VARIABLES:
  OPENAI_BASE_URL   OpenAI-compatible endpoint, e.g. https://openrouter.ai/api/v1
  OPENAI_API_KEY    Bearer credential for that endpoint
  NOTES2MD_MODEL    Model ID (default: mistralai/mistral-7b-instruct)
  TESSERACT_CMD     Path to the tesseract executable
  RUST_LOG          Override log filtering

SETUP:
  1. Install tesseract:  apt install tesseract-ocr   |  brew install tesseract
  2. Set endpoint:       export OPENAI_BASE_URL=... OPENAI_API_KEY=...
  3. Convert:            notes2md photos/ --refine -o out/
"#;

/// Turn a folder of note photos into structured Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "notes2md",
    version,
    about = "Turn a folder of note photos into structured Markdown",
    long_about = "OCR every image in a folder in natural filename order, then optionally \
restyle the text into Markdown with a language model (format only, never summarised) or \
with deterministic line rules.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing .png/.jpg/.jpeg/.bmp/.tiff images.
    folder: PathBuf,

    /// Write ocr_notes / ai_notes into this directory instead of stdout.
    #[arg(short, long, env = "NOTES2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Refine the OCR text into Markdown with a language model.
    #[arg(long, env = "NOTES2MD_REFINE")]
    refine: bool,

    /// Render documents with this converter (invoked as `<cmd> in.md -o out.pdf`).
    #[arg(long, env = "NOTES2MD_PDF_COMMAND")]
    pdf_command: Option<String>,

    /// Apply rule-based formatting to the OCR notes.
    #[arg(long, env = "NOTES2MD_RULE_FORMAT")]
    rule_format: bool,

    /// Output a structured JSON report instead of Markdown.
    #[arg(long, env = "NOTES2MD_JSON")]
    json: bool,

    /// Token budget per refinement chunk.
    #[arg(long, env = "NOTES2MD_MAX_CHUNK_TOKENS", default_value_t = 1800)]
    max_chunk_tokens: usize,

    /// Model ID.
    #[arg(long, env = "NOTES2MD_MODEL")]
    model: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, ...)
    /// instead of the raw OpenAI-compatible endpoint.
    #[arg(long, env = "NOTES2MD_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Bearer credential for the endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Max output tokens per chunk.
    #[arg(long, env = "NOTES2MD_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "NOTES2MD_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per chunk on completion failure.
    #[arg(long, env = "NOTES2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Chunks refined concurrently (output order is unaffected).
    #[arg(short, long, env = "NOTES2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Leave failed chunks out instead of aborting.
    #[arg(long, env = "NOTES2MD_SKIP_FAILED_CHUNKS")]
    skip_failed_chunks: bool,

    /// Per-chunk completion timeout in seconds.
    #[arg(long, env = "NOTES2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "NOTES2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// tesseract executable.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Disable progress bar.
    #[arg(long, env = "NOTES2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTES2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTES2MD_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    extraction: &'a ExtractionOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    refinement: Option<&'a RefinementOutput>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} Interrupted: finishing the current unit…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };

    // ── Validate refinement setup before any OCR work ────────────────────
    let refinement = if cli.refine {
        let client = build_backend(&cli)?;
        let estimator = Cl100kEstimator::new().context("Failed to load token estimator")?;
        let config = build_refinement_config(&cli, progress_cb.clone(), cancel.clone()).await?;
        Some((client, estimator, config))
    } else {
        None
    };

    let engine = TesseractEngine::new(&cli.tesseract);
    let version = engine.probe().with_context(|| {
        format!(
            "tesseract not usable at {:?}; install it or pass --tesseract",
            cli.tesseract
        )
    })?;
    tracing::debug!("Using {}", version);

    // ── Scan ─────────────────────────────────────────────────────────────
    let mut extraction_config = ExtractionConfig::builder().cancel(cancel.clone());
    if let Some(ref cb) = progress_cb {
        extraction_config = extraction_config.progress_callback(Arc::clone(cb));
    }
    let extraction_config = extraction_config.build().context("Invalid configuration")?;

    let engine: Arc<dyn OcrEngine> = Arc::new(engine);
    let scan = scan_folder(&cli.folder, engine, &extraction_config)
        .await
        .context("Scanning failed")?;

    if !cli.quiet && !cli.json {
        for warning in &scan.warnings {
            eprintln!("{} {}", cyan("⚠"), warning);
        }
        for failure in scan.failures() {
            if let Some(ref e) = failure.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
        eprintln!("{}", dim(&scan.summary()));
    }
    if scan.cancelled {
        bail!("Interrupted after {}", scan.summary());
    }

    let raw = scan.raw_text();
    let ocr_notes = if cli.rule_format {
        format_notes(&raw)
    } else {
        raw.clone()
    };

    // ── Refine ───────────────────────────────────────────────────────────
    let refined = match refinement {
        Some((client, estimator, config)) => Some(
            refine(&raw, &client, &estimator, &config)
                .await
                .context("Refinement failed")?,
        ),
        None => None,
    };
    if let Some(ref r) = refined {
        let failed = r.failed_chunks();
        if !failed.is_empty() && !cli.quiet {
            eprintln!(
                "{} chunk(s) {:?} of {} could not be refined and are missing from the output",
                cyan("⚠"),
                failed,
                r.stats.total_chunks
            );
        }
    }

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref dir) = cli.output {
        let renderer: Arc<dyn DocumentRenderer> = match cli.pdf_command {
            Some(ref cmd) => Arc::new(CommandRenderer::new(cmd, "pdf")),
            None => Arc::new(MarkdownRenderer),
        };
        let ocr_path = write_ocr_notes(dir, &ocr_notes, Arc::clone(&renderer))
            .await
            .context("Failed to write OCR notes")?;
        if !cli.quiet {
            eprintln!("{} {}", green("✔"), bold(&ocr_path.display().to_string()));
        }
        if let Some(ref r) = refined {
            let ai_path = write_ai_notes(dir, &r.markdown, renderer)
                .await
                .context("Failed to write refined notes")?;
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), bold(&ai_path.display().to_string()));
            }
        }
    }

    if cli.json {
        let report = Report {
            extraction: &scan,
            refinement: refined.as_ref(),
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let text = refined.as_ref().map_or(ocr_notes.as_str(), |r| r.markdown.as_str());
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.is_empty() && !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if let Some(ref r) = refined {
        if !cli.quiet && !cli.json {
            eprintln!(
                "   {} tokens in  /  {} tokens out,  {}ms",
                dim(&r.stats.total_prompt_tokens.to_string()),
                dim(&r.stats.total_completion_tokens.to_string()),
                r.stats.duration_ms,
            );
        }
    }

    Ok(())
}

/// Construct the completion client. Fails fast on missing configuration.
fn build_backend(cli: &Cli) -> Result<Backend> {
    if let Some(ref provider) = cli.provider {
        let model = cli.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let client = ProviderClient::from_name(provider, model)?;
        return Ok(Backend::Provider(client));
    }

    let base_url = cli.base_url.clone();
    let api_key = cli.api_key.clone();
    let mut settings = CompletionSettings::from_lookup(|key| match key {
        ENV_BASE_URL => base_url.clone(),
        ENV_API_KEY => api_key.clone(),
        other => std::env::var(other).ok(),
    })?;
    if let Some(ref model) = cli.model {
        settings = settings.with_model(model);
    }
    settings.request_timeout_secs = cli.api_timeout;
    Ok(Backend::OpenAiCompatible(OpenAiCompatibleClient::new(settings)?))
}

/// Map CLI args to `RefinementConfig`.
async fn build_refinement_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<RefinementConfig> {
    let mut builder = RefinementConfig::builder()
        .max_chunk_tokens(cli.max_chunk_tokens)
        .max_output_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .api_timeout_secs(cli.api_timeout)
        .failure_policy(if cli.skip_failed_chunks {
            ChunkFailurePolicy::Skip
        } else {
            ChunkFailurePolicy::Abort
        })
        .cancel(cancel);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

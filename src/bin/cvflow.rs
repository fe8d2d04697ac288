//! CLI binary for edgequake-cvflow.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, wires the production collaborators and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_cvflow::{
    submission, Backlog, BacklogColumns, BatchReport, BatchStats, Pipeline, PipelineConfig,
    PipelineProgressCallback, ProgressCallback, StopSignal, Submission, SubmissionOutcome,
    SubmissionState,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// finished submission.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} CVs  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting batch of {total} submission(s)…"))
        ));
    }

    fn on_submission_start(&self, _index: usize, _total: usize, candidate_name: &str) {
        self.bar.set_message(candidate_name.to_string());
    }

    fn on_submission_complete(&self, index: usize, total: usize, outcome: &SubmissionOutcome) {
        let secs = dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0));
        let line = match (&outcome.state, &outcome.error) {
            (SubmissionState::Recorded, _) => format!(
                "  {} {:>3}/{:<3}  {}  {}  {}",
                green("✓"),
                index,
                total,
                outcome.candidate_name,
                dim(&delivered_to(outcome)),
                secs
            ),
            (SubmissionState::Skipped, _) => format!(
                "  {} {:>3}/{:<3}  {}  {}",
                dim("↷"),
                index,
                total,
                outcome.candidate_name,
                dim("already processed")
            ),
            (_, error) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                let msg = error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                let msg = if msg.chars().count() > 80 {
                    format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
                } else {
                    msg
                };
                format!(
                    "  {} {:>3}/{:<3}  {}  {}  {}",
                    red("✗"),
                    index,
                    total,
                    outcome.candidate_name,
                    red(&msg),
                    secs
                )
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        eprintln!(
            "{} {} recorded, {} skipped, {} failed{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&stats.recorded.to_string()),
            stats.skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
            if stats.cancelled > 0 {
                format!(", {} cancelled", stats.cancelled)
            } else {
                String::new()
            }
        );
    }
}

fn delivered_to(outcome: &SubmissionOutcome) -> String {
    outcome
        .deliveries
        .iter()
        .filter(|d| d.status.holds_artifact())
        .map(|d| d.category.label())
        .collect::<Vec<_>>()
        .join(", ")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One CV, filed under ./output/<Category>/
  cvflow process --token resp-42 --name "Jane Doe" https://api.typeform.com/.../cv.pdf

  # Work through a form export, 5 s between LLM calls (default)
  cvflow backlog submissions.csv

  # Same, using a 12 requests/minute token bucket instead
  cvflow --rpm 12 backlog submissions.csv

  # Handle a saved webhook body (or '-' for stdin)
  cvflow webhook payload.json

  # Mask e-mails and phone numbers only
  cvflow redact --name "Jane Doe" cv.pdf -o cleaned/

  # Machine-readable report
  cvflow --json backlog submissions.csv > report.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (gemini-2.5-flash by default)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  TYPEFORM_TOKEN          Bearer token for document downloads
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  CVFLOW_FONT             TrueType font with Turkish glyphs (else ASCII transliteration)

  A .env file in the working directory is loaded first.
"#;

/// Standardize and file résumé PDFs with an LLM, once per submission.
#[derive(Parser, Debug)]
#[command(
    name = "cvflow",
    version,
    about = "Standardize and file résumé PDFs with an LLM, once per submission",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-nano).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Ledger file of processed submission tokens.
    #[arg(long, global = true, env = "CVFLOW_LEDGER", default_value = "processed_tokens.txt")]
    ledger: PathBuf,

    /// Root directory for category folders.
    #[arg(long, global = true, env = "CVFLOW_OUTPUT", default_value = "output")]
    output_root: PathBuf,

    /// TrueType font with extended glyphs.
    #[arg(long, global = true, env = "CVFLOW_FONT")]
    font: Option<PathBuf>,

    /// pdfium library file or directory.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// Bearer token for document downloads.
    #[arg(long, global = true, env = "TYPEFORM_TOKEN", hide_env_values = true)]
    credential: Option<String>,

    /// Minimum text characters before falling back to image mode.
    #[arg(long, global = true, env = "CVFLOW_MIN_TEXT_CHARS", default_value_t = 50)]
    min_text_chars: usize,

    /// Milliseconds between LLM calls.
    #[arg(long, global = true, env = "CVFLOW_COOLDOWN_MS", default_value_t = 5000)]
    cooldown_ms: u64,

    /// Token-bucket quota (calls per minute); overrides --cooldown-ms.
    #[arg(long, global = true, env = "CVFLOW_RPM")]
    rpm: Option<u32>,

    /// Download attempts per submission.
    #[arg(long, global = true, env = "CVFLOW_FETCH_ATTEMPTS", default_value_t = 3)]
    fetch_attempts: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "CVFLOW_FETCH_TIMEOUT", default_value_t = 60)]
    fetch_timeout: u64,

    /// Per LLM call timeout in seconds.
    #[arg(long, global = true, env = "CVFLOW_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Overall time budget per submission in seconds.
    #[arg(long, global = true, env = "CVFLOW_SUBMISSION_TIMEOUT", default_value_t = 300)]
    submission_timeout: u64,

    /// LLM temperature (0.0-2.0).
    #[arg(long, global = true, env = "CVFLOW_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "CVFLOW_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Print a JSON report on stdout.
    #[arg(long, global = true, env = "CVFLOW_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "CVFLOW_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CVFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CVFLOW_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one submission.
    Process {
        /// Document URL or local path.
        source: String,
        /// Candidate display name.
        #[arg(long)]
        name: String,
        /// Stable submission token; defaults to the source.
        #[arg(long)]
        token: Option<String>,
    },
    /// Process every row of a CSV backlog export.
    Backlog {
        /// CSV file.
        file: PathBuf,
        /// Header of the name column.
        #[arg(long, default_value = "Ad ve Soyad")]
        name_header: String,
        /// Header of the token column.
        #[arg(long, default_value = "Token")]
        token_header: String,
        /// Stop after this many rows.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Process a form webhook body from a file ('-' reads stdin).
    Webhook {
        payload: PathBuf,
    },
    /// Mask e-mail addresses and phone numbers and save `{name}_Cleaned.pdf`.
    Redact {
        /// Document URL or local path.
        source: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        token: Option<String>,
        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is shown.
    let show_progress = !opts.quiet && !opts.no_progress && !opts.json;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    let config = build_config(opts)?;
    // Redaction never calls the LLM, so it runs without a provider.
    let mut pipeline = if matches!(cli.command, Command::Redact { .. }) {
        Pipeline::for_redaction(config, &opts.ledger, &opts.output_root).await
    } else {
        Pipeline::from_config(config, &opts.ledger, &opts.output_root).await
    }
    .context("Failed to set up pipeline")?;
    if show_progress && !matches!(cli.command, Command::Redact { .. }) {
        pipeline = pipeline.with_progress(CliProgressCallback::new() as ProgressCallback);
    }

    match &cli.command {
        Command::Process { source, name, token } => {
            let token = token.clone().unwrap_or_else(|| source.clone());
            let submission = Submission::new(token, name.clone(), source.clone());
            run_batch(&pipeline, vec![submission], opts).await
        }
        Command::Backlog {
            file,
            name_header,
            token_header,
            limit,
        } => {
            let columns = BacklogColumns {
                name_header: name_header.clone(),
                token_header: token_header.clone(),
                ..BacklogColumns::default()
            };
            let backlog = Backlog::from_path(file, &columns).context("Failed to read backlog")?;
            if !opts.quiet && backlog.skipped_rows > 0 {
                eprintln!("{} {} row(s) without a document URL", dim("↷"), backlog.skipped_rows);
            }
            let mut submissions = backlog.submissions;
            if let Some(n) = limit {
                submissions.truncate(*n);
            }
            run_batch(&pipeline, submissions, opts).await
        }
        Command::Webhook { payload } => {
            let body = read_payload(payload)?;
            let value: serde_json::Value =
                serde_json::from_str(&body).context("Webhook body is not JSON")?;
            let submission = submission::from_webhook(&value).context("Webhook payload rejected")?;
            run_batch(&pipeline, vec![submission], opts).await
        }
        Command::Redact {
            source,
            name,
            token,
            out_dir,
        } => {
            let token = token.clone().unwrap_or_else(|| source.clone());
            let submission = Submission::new(token, name.clone(), source.clone());
            let outcome = pipeline
                .redact_submission(&submission)
                .await
                .context("Redaction failed")?;

            tokio::fs::create_dir_all(out_dir)
                .await
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            let path = out_dir.join(&outcome.file_name);
            tokio::fs::write(&path, &outcome.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            if opts.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to serialise report")?
                );
            } else if !opts.quiet {
                if outcome.already_processed {
                    eprintln!("{} token was already processed", cyan("⚠"));
                }
                eprintln!(
                    "{}  {} region(s) masked on {} page(s)  →  {}",
                    green("✔"),
                    outcome.summary.regions_redacted,
                    outcome.summary.pages_modified,
                    bold(&path.display().to_string()),
                );
            }
            Ok(())
        }
    }
}

async fn run_batch(pipeline: &Pipeline, submissions: Vec<Submission>, opts: &GlobalOpts) -> Result<()> {
    let stop = Arc::new(StopSignal::new());
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Stopping after the current submission…");
                stop.stop();
            }
        });
    }

    let report = pipeline.process_batch(&submissions, Some(&stop)).await;
    print_report(&report, opts)?;

    if report.stats.failed > 0 && report.stats.recorded == 0 && report.stats.skipped == 0 {
        anyhow::bail!("All {} submission(s) failed", report.stats.failed);
    }
    Ok(())
}

fn print_report(report: &BatchReport, opts: &GlobalOpts) -> Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }
    if opts.quiet {
        return Ok(());
    }
    // The progress callback already printed per-submission lines.
    if opts.no_progress {
        for o in &report.outcomes {
            match &o.error {
                None => eprintln!("{:?}  {}  {}", o.state, o.candidate_name, delivered_to(o)),
                Some(e) => eprintln!("Failed  {}  [{}] {}", o.candidate_name, e.classification(), e),
            }
        }
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out  ·  {}ms total",
        dim(&report.stats.total_input_tokens.to_string()),
        dim(&report.stats.total_output_tokens.to_string()),
        report.stats.total_duration_ms,
    );
    Ok(())
}

fn read_payload(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read webhook body from stdin")?;
        Ok(body)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read webhook body from {}", path.display()))
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(opts: &GlobalOpts) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .min_text_chars(opts.min_text_chars)
        .temperature(opts.temperature)
        .max_tokens(opts.max_tokens)
        .fetch_attempts(opts.fetch_attempts)
        .fetch_timeout_secs(opts.fetch_timeout)
        .api_timeout_secs(opts.api_timeout)
        .submission_timeout_secs(opts.submission_timeout)
        .cooldown_ms(opts.cooldown_ms);

    if let Some(rpm) = opts.rpm {
        builder = builder.requests_per_minute(rpm);
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref font) = opts.font {
        builder = builder.font_path(font.clone());
    }
    if let Some(ref lib) = opts.pdfium {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ref token) = opts.credential {
        builder = builder.credential(token.clone());
    }

    builder.build().context("Invalid configuration")
}

//! CLI binary for edgequake-pdfstruct.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `NormalizerConfig` and prints the normalized document as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfstruct::normalize::write_json;
use edgequake_pdfstruct::{
    normalize_path, BackendKind, CloudConfig, Document, NormalizeProgressCallback, NormalizerConfig,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the document is probed and
/// analysed, then a page bar once the route and page count are known.
struct CliProgressCallback {
    bar: ProgressBar,
    sentences: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Probing");
        bar.set_message("Reading text layer…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            sentences: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Normalizing");
    }
}

impl NormalizeProgressCallback for CliProgressCallback {
    fn on_normalize_start(&self, total_pages: usize, route: BackendKind) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Normalizing {total_pages} pages via {route}…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, sentence_count: usize) {
        self.sentences.fetch_add(sentence_count, Ordering::Relaxed);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{sentence_count:>4} sentences")),
        ));
        self.bar.inc(1);
    }

    fn on_page_discarded(&self, page_num: usize, total: usize) {
        self.bar.println(format!("  {} Page {:>3}/{:<3}  discarded", yellow("⚠"), page_num, total));
    }

    fn on_normalize_complete(&self, _total_pages: usize, committed_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages, {} sentences",
            green("✔"),
            bold(&committed_pages.to_string()),
            self.sentences.load(Ordering::Relaxed)
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Normalize to stdout
  pdfstruct manual.pdf

  # Write JSON to a file
  pdfstruct manual.pdf -o manual.json

  # Route summary only
  pdfstruct --summary scanned.pdf

  # Normalize from URL with tighter fragment merging
  pdfstruct --fragment-words 10 https://example.com/datasheet.pdf

ENVIRONMENT VARIABLES:
  AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT  Cloud analysis endpoint (enables OCR route)
  AZURE_DOCUMENT_INTELLIGENCE_KEY       Cloud analysis subscription key
  AZURE_DOCUMENT_INTELLIGENCE_MODEL     Analysis model (default: prebuilt-document)
  PDFIUM_LIB_PATH                       Directory or file of an existing libpdfium
  RUST_LOG                              Override log filter (e.g. edgequake_pdfstruct=debug)

ROUTING:
  Every document is first parsed locally. If any page looks scanned (no
  text, or images with fewer than --min-chars characters) and cloud analysis
  is configured, the document is sent to the cloud. Any cloud failure falls
  back to the local text layer; the summary records why.
"#;

/// Normalize PDF layout into pages, lines, paragraphs and sentences.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstruct",
    version,
    about = "Normalize PDF layout into pages, lines, paragraphs and sentences",
    long_about = "Normalize the layout of a PDF (local file or URL) into one hierarchical \
document model with unit-square bounding boxes. Uses Azure Document Intelligence for scanned \
documents when configured and the embedded text layer otherwise.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDFSTRUCT_OUTPUT")]
    output: Option<PathBuf>,

    /// Print only the normalization summary.
    #[arg(long)]
    summary: bool,

    /// Never call the cloud analyser, even for scanned documents.
    #[arg(long, env = "PDFSTRUCT_NO_CLOUD")]
    no_cloud: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSTRUCT_PASSWORD")]
    password: Option<String>,

    /// Blocks with fewer words are merged into the next block.
    #[arg(long, default_value_t = 15)]
    fragment_words: usize,

    /// Share of a line's words that must appear in a paragraph (0.0–1.0).
    #[arg(long, default_value_t = 0.9)]
    word_overlap: f64,

    /// Minimum box overlap between a line and a paragraph (0.0–1.0).
    #[arg(long, default_value_t = 0.1)]
    spatial_overlap: f64,

    /// Pages with images and fewer non-whitespace characters count as scans.
    #[arg(long, default_value_t = 100)]
    min_chars: usize,

    /// Deadline for the whole cloud analysis in seconds.
    #[arg(long, env = "PDFSTRUCT_CLOUD_TIMEOUT", default_value_t = 120)]
    cloud_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDFSTRUCT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSTRUCT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSTRUCT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFSTRUCT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn NormalizeProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run normalization ────────────────────────────────────────────────
    let doc = normalize_path(&cli.input, &config)
        .await
        .context("Normalization failed")?;

    if cli.summary {
        print_summary(&cli.input, &doc);
        return Ok(());
    }

    if let Some(ref output_path) = cli.output {
        write_json(&doc, output_path)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                green("✔"),
                doc.pages.len(),
                doc.summary.duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialise output")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    Ok(())
}

/// Map CLI args to `NormalizerConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<NormalizerConfig> {
    let mut builder = NormalizerConfig::builder()
        .fragment_word_threshold(cli.fragment_words)
        .word_overlap_threshold(cli.word_overlap)
        .spatial_overlap_threshold(cli.spatial_overlap)
        .min_chars_per_page(cli.min_chars)
        .download_timeout_secs(cli.download_timeout);

    if !cli.no_cloud {
        if let Some(mut cloud) = CloudConfig::from_env() {
            cloud.timeout_secs = cli.cloud_timeout;
            builder = builder.cloud(cloud);
        }
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(input: &str, doc: &Document) {
    let s = &doc.summary;
    println!("File:              {}", input);
    println!("Route:             {}", s.route);
    println!("Probe needs OCR:   {}", s.probe_needs_ocr);
    if !s.pages_needing_ocr.is_empty() {
        let pages: Vec<String> = s.pages_needing_ocr.iter().map(u32::to_string).collect();
        println!("Scanned pages:     {}", pages.join(", "));
    }
    if s.probe_failed {
        println!("Probe failed:      true");
    }
    println!("OCR applied:       {}", s.ocr_applied);
    if let Some(ref reason) = s.fallback_reason {
        println!("Fallback reason:   {}", reason);
    }
    println!("Pages:             {}", doc.pages.len());
    println!("Lines:             {}", doc.lines.len());
    println!("Paragraphs:        {}", doc.paragraphs.len());
    println!("Sentences:         {}", doc.sentences.len());
    println!("Tables:            {}", doc.tables.len());
    println!("Key/value pairs:   {}", doc.key_value_pairs.len());
    println!("Merged fragments:  {}", s.merged_blocks);
    println!("Duration:          {}ms", s.duration_ms);
}

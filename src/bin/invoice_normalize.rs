//! CLI binary for edgequake-invoice.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, scores payload files and prints the results.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use edgequake_invoice::{
    write_output, BatchProgressCallback, DocumentKind, FieldWeights, InvoiceOutput, InvoicePipeline,
    PipelineConfig, ProgressCallback, RoutingStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

fn status_badge(status: RoutingStatus) -> String {
    match status {
        RoutingStatus::AutoApproved => green(status.as_str()),
        RoutingStatus::NeedsReview => yellow(status.as_str()),
        RoutingStatus::Rejected => red(status.as_str()),
    }
}

// ── Batch progress bar ───────────────────────────────────────────────────────

/// Renders one bar for the batch and a log line per finished payload.
/// Items finish out of order, so every line carries its input index.
struct CliBatchProgress {
    bar: ProgressBar,
    sources: Vec<PathBuf>,
    errors: AtomicUsize,
}

impl CliBatchProgress {
    fn new(sources: Vec<PathBuf>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>4}/{len} invoices  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        let bar = ProgressBar::new(sources.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Scoring");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            sources,
            errors: AtomicUsize::new(0),
        })
    }

    fn name(&self, index: usize) -> String {
        self.sources
            .get(index)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("#{index}"))
    }
}

impl BatchProgressCallback for CliBatchProgress {
    fn on_item_complete(&self, index: usize, _total: usize, status: RoutingStatus) {
        self.bar.println(format!(
            "  {} {:<32} {}",
            green("✓"),
            self.name(index),
            status_badge(status)
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<32} {}", red("✗"), self.name(index), red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} invoices scored", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} invoices scored  ({} failed)",
                if failed == total { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Score one extraction payload
  invoice-normalize payload.json

  # Full JSON (canonical record, verdict, confidence)
  invoice-normalize --json payload.json

  # Score a directory of payloads, write the batch report
  invoice-normalize extractions/*.json -o report.json

  # Reproducible run: fix the processing date
  invoice-normalize --as-of 2024-06-30 payload.json

  # Check an upload before sending it for extraction
  invoice-normalize --document scan.jpg

  # Stricter routing, EUR fallback
  invoice-normalize --review-threshold 0.8 --reject-threshold 0.4 --currency EUR payload.json

ROUTING:
  score >= review threshold            auto_approved
  reject threshold <= score < review   needs_review
  score < reject threshold             rejected
  Records that fail validation are multiplied by --penalty before routing.
"#;

/// Normalize, validate and confidence-score invoice extraction payloads.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-normalize",
    version,
    about = "Normalize, validate and confidence-score invoice extraction payloads",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Extraction payload JSON files.
    #[arg(required_unless_present = "document")]
    inputs: Vec<PathBuf>,

    /// Run the upload gate (size, PDF magic, image quality) on a document.
    #[arg(long, env = "INVOICE_DOCUMENT")]
    document: Option<PathBuf>,

    /// Processing date (YYYY-MM-DD) used for date-ordering checks. Default: today.
    #[arg(long, env = "INVOICE_AS_OF")]
    as_of: Option<String>,

    /// Write JSON output to this file instead of stdout.
    #[arg(short, long, env = "INVOICE_OUTPUT")]
    output: Option<PathBuf>,

    /// Print full JSON instead of a summary (single payload).
    #[arg(long, env = "INVOICE_JSON")]
    json: bool,

    /// Fallback currency code when a payload has none.
    #[arg(long, env = "INVOICE_DEFAULT_CURRENCY", default_value = "USD")]
    currency: String,

    /// Scores at or above this are auto-approved.
    #[arg(long, env = "INVOICE_REVIEW_THRESHOLD", default_value_t = 0.7)]
    review_threshold: f64,

    /// Scores below this are rejected.
    #[arg(long, env = "INVOICE_REJECT_THRESHOLD", default_value_t = 0.3)]
    reject_threshold: f64,

    /// Score multiplier for records that fail validation, in (0, 1).
    #[arg(long, env = "INVOICE_PENALTY", default_value_t = 0.6)]
    penalty: f64,

    /// Group weights as vendor,dates,totals,line_items (must sum to 1).
    #[arg(long, env = "INVOICE_WEIGHTS", default_value = "0.30,0.20,0.40,0.10")]
    weights: String,

    /// Upload size limit in bytes for --document.
    #[arg(long, env = "INVOICE_MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: u64,

    /// Number of payloads scored concurrently.
    #[arg(short, long, env = "INVOICE_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let batch = cli.inputs.len() > 1;
    let show_progress = batch && !cli.quiet && !cli.no_progress;
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

    let now = processing_time(cli.as_of.as_deref())?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliBatchProgress::new(cli.inputs.clone());
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let pipeline = InvoicePipeline::new(build_config(&cli, progress_cb)?);

    // ── Upload gate ──────────────────────────────────────────────────────
    if let Some(ref document) = cli.document {
        let check = pipeline
            .check_upload(document)
            .await
            .with_context(|| format!("Upload rejected: {}", document.display()))?;
        if cli.inputs.is_empty() {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&check).context("Failed to serialise report")?
                );
            } else {
                println!("File:     {}", check.path.display());
                println!("Size:     {} bytes", check.size);
                println!(
                    "Kind:     {}",
                    match check.kind {
                        DocumentKind::Pdf => "pdf",
                        DocumentKind::Image => "image",
                    }
                );
                match check.quality {
                    Some(ref q) => println!("Quality:  {} (score {:.2})", q.reason, q.score),
                    None => println!("Quality:  skipped"),
                }
            }
            return Ok(());
        } else if !cli.quiet {
            eprintln!("{} upload gate passed: {}", green("✔"), document.display());
        }
    }

    // ── Batch ────────────────────────────────────────────────────────────
    if batch {
        let result = pipeline.process_batch(&cli.inputs, now).await;
        match cli.output {
            Some(ref path) => {
                write_output(&result, path)
                    .await
                    .context("Failed to write batch report")?;
                if !cli.quiet {
                    let s = &result.stats;
                    eprintln!(
                        "{}  {} auto_approved  {} needs_review  {} rejected  {} failed  {}ms  →  {}",
                        if s.failed == 0 { green("✔") } else { yellow("⚠") },
                        s.auto_approved,
                        s.needs_review,
                        s.rejected,
                        s.failed,
                        s.total_duration_ms,
                        bold(&path.display().to_string()),
                    );
                }
            }
            None => println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to serialise batch")?
            ),
        }
        return Ok(());
    }

    // ── Single payload ───────────────────────────────────────────────────
    let Some(input) = cli.inputs.first() else {
        return Ok(());
    };
    let output = pipeline
        .process_file(input, now)
        .await
        .with_context(|| format!("Failed to process {}", input.display()))?;

    if let Some(ref path) = cli.output {
        write_output(&output, path)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} ({:.2})  →  {}",
                green("✔"),
                status_badge(output.status()),
                output.confidence.score,
                bold(&path.display().to_string()),
            );
        }
    } else if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else {
        print_summary(&output);
    }

    Ok(())
}

fn print_summary(output: &InvoiceOutput) {
    let c = &output.canonical;
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| dim("—"));

    println!("Vendor:        {}", or_dash(Some(c.vendor_name.clone()).filter(|v| !v.is_empty())));
    println!("Invoice #:     {}", or_dash(c.invoice_number.clone()));
    println!("Invoice date:  {}", or_dash(c.invoice_date.map(|d| d.to_string())));
    println!("Due date:      {}", or_dash(c.due_date.map(|d| d.to_string())));
    println!("Subtotal:      {}", or_dash(c.subtotal.map(|v| v.to_string())));
    println!("Tax:           {}", or_dash(c.tax_amount.map(|v| v.to_string())));
    println!("Total:         {}", or_dash(c.total_amount.map(|v| v.to_string())));
    println!(
        "Currency:      {}{}",
        c.currency,
        if c.currency_defaulted { dim(" (default)") } else { String::new() }
    );
    println!("Terms:         {}", or_dash(c.payment_terms.clone()));
    println!("Line items:    {}", c.line_items.len());
    println!();

    let v = &output.validation;
    if v.is_valid {
        println!("Valid:         {}", green("yes"));
    } else {
        println!(
            "Valid:         {} ({})",
            red("no"),
            v.reason.as_deref().unwrap_or("unknown")
        );
        for extra in v.failures.iter().skip(1) {
            println!("               {}", dim(&extra.to_string()));
        }
    }

    let conf = &output.confidence;
    println!(
        "Confidence:    {:.4}  {}{}",
        conf.score,
        status_badge(conf.status),
        if conf.penalty_applied { dim("  (penalised)") } else { String::new() }
    );
    for (field, s) in &conf.field_scores {
        println!("  {:<16} {:.2}", dim(field), s);
    }
}

/// `--as-of` date at midnight UTC, or now.
fn processing_time(as_of: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(s) = as_of else {
        return Ok(Utc::now());
    };
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid --as-of date '{s}', expected YYYY-MM-DD"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .default_currency(&cli.currency)
        .review_threshold(cli.review_threshold)
        .reject_threshold(cli.reject_threshold)
        .invalid_penalty(cli.penalty)
        .weights(parse_weights(&cli.weights)?)
        .max_file_size(cli.max_file_size)
        .concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--weights v,d,t,l` into `FieldWeights`.
fn parse_weights(s: &str) -> Result<FieldWeights> {
    let parts = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid weight: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    let &[vendor, dates, totals, line_items] = parts.as_slice() else {
        bail!(
            "Expected 4 weights (vendor,dates,totals,line_items), got {}",
            parts.len()
        );
    };
    Ok(FieldWeights {
        vendor,
        dates,
        totals,
        line_items,
    })
}

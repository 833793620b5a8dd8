//! CLI binary for bankscan.
//!
//! A thin shim over the library crate: maps flags to `ExtractionConfig`,
//! runs one extraction (or starts the API with `--serve`), and prints
//! results.

use anyhow::{Context, Result};
use bankscan::run::PipelinePhase;
use bankscan::{
    extract, start_server, ApiState, ExtractionConfig, ExtractionOutput, RecordStore, TextSource,
};
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one document, human-readable summary
  bankscan check.pdf

  # Full JSON output (record + stats + degradations)
  bankscan --json check.pdf

  # Persist the record into a SQLite database
  bankscan --db bankdata.db check.pdf

  # Higher DPI for small-font statements
  bankscan --dpi 300 statement.pdf

  # Start the HTTP API
  bankscan --serve --db bankdata.db --addr 0.0.0.0:5000

  # Keep per-run scratch artifacts for debugging a bad scan
  bankscan --keep-artifacts --json check.pdf

EXTERNAL TOOLS:
  pdftoppm   (poppler-utils)   rasterises PDF pages
  tesseract  (tesseract-ocr)   recognition engine

  Both are needed only on the OCR path; a PDF with a sufficient embedded
  text layer never touches either. Install:
    apt install poppler-utils tesseract-ocr

ENVIRONMENT VARIABLES:
  BANKSCAN_ADDR     API bind address (same as --addr)
  BANKSCAN_DB       Database path (same as --db)
  BANKSCAN_UPLOADS  Uploads directory (same as --uploads-dir)
  RUST_LOG          Tracing filter; overrides -v / -q

SETUP:
  1. Install the external tools:  apt install poppler-utils tesseract-ocr
  2. Extract:                     bankscan check.pdf
  3. Or serve the API:            bankscan --serve --db bankdata.db
"#;

/// Extract structured banking fields from scanned checks and statements.
#[derive(Parser, Debug)]
#[command(
    name = "bankscan",
    version,
    about = "Extract structured banking fields from scanned checks and statements",
    long_about = "Extract account, routing, check number, IFSC, bank and branch fields from \
bank documents (PDF or image). PDFs with an embedded text layer are read directly; scans go \
through rasterisation, normalization, page OCR, and digit-whitelisted MICR band recognition.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to extract (PDF or image). Not used with --serve.
    input: Option<PathBuf>,

    /// Start the HTTP API instead of extracting a single document.
    #[arg(long)]
    serve: bool,

    /// API bind address.
    #[arg(long, env = "BANKSCAN_ADDR", default_value = "127.0.0.1:5000")]
    addr: String,

    /// SQLite database path. Single extractions persist when set; --serve
    /// always persists (default: bankdata.db).
    #[arg(long, env = "BANKSCAN_DB")]
    db: Option<PathBuf>,

    /// Directory where API uploads are staged.
    #[arg(long, env = "BANKSCAN_UPLOADS", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Rasterisation DPI (100–600).
    #[arg(long, default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(100..=600))]
    dpi: u32,

    /// OCR language code (e.g. eng, eng+hin).
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Do not persist, even when --db is set.
    #[arg(long)]
    no_persist: bool,

    /// Keep the per-run scratch directory (rasterised pages, crops).
    #[arg(long)]
    keep_artifacts: bool,

    /// Print the full extraction output as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress everything except errors and the extracted data.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    if cli.serve {
        return serve(&cli, config).await;
    }

    let Some(input) = cli.input.clone() else {
        anyhow::bail!("No input document given (pass a file path, or --serve to start the API)");
    };
    run_extract(&cli, &input, config).await
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    ExtractionConfig::builder()
        .dpi(cli.dpi)
        .ocr_language(cli.lang.clone())
        .keep_artifacts(cli.keep_artifacts)
        .build()
        .context("Invalid configuration")
}

async fn serve(cli: &Cli, config: ExtractionConfig) -> Result<()> {
    let db = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from("bankdata.db"));
    let store =
        RecordStore::open(&db).with_context(|| format!("Failed to open database {db:?}"))?;
    let state = ApiState::new(config, store, cli.uploads_dir.clone());

    if !cli.quiet {
        eprintln!(
            "{} bankscan API on {}  {}",
            green("▶"),
            bold(&cli.addr),
            dim(&format!("db: {}", db.display())),
        );
    }
    start_server(&cli.addr, state)
        .await
        .context("API server failed")
}

async fn run_extract(cli: &Cli, input: &Path, config: ExtractionConfig) -> Result<()> {
    let output = extract(input, &config).await.context("Extraction failed")?;

    // Persist before printing so the summary can show the row id.
    let mut stored_id = None;
    if let (Some(db), false) = (&cli.db, cli.no_persist) {
        let store =
            RecordStore::open(db).with_context(|| format!("Failed to open database {db:?}"))?;
        let stored = store
            .insert(&output.record)
            .context("Failed to persist record")?;
        PipelinePhase::Persisted.log(&output.stats.run_id);
        stored_id = Some(stored.id);
    }
    PipelinePhase::Done.log(&output.stats.run_id);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else {
        print_summary(&output, stored_id, cli.quiet);
    }
    Ok(())
}

/// Human-readable field summary: data on stdout, wrap-up on stderr.
fn print_summary(output: &ExtractionOutput, stored_id: Option<i64>, quiet: bool) {
    let r = &output.record;
    let s = &output.stats;

    println!("{}", bold("Extracted fields"));
    print_field("Account name", &r.account_name);
    print_field("Account number", &r.account_number);
    print_field("Routing number", &r.routing_number);
    print_field("Check number", &r.check_number);
    print_field("IFSC", &r.ifsc);
    print_field("Bank", &r.bank_name);
    print_field("Branch", &r.branch);
    if !r.raw_micr.is_empty() {
        print_field("MICR digits", &r.raw_micr);
    }

    if quiet {
        return;
    }

    let source = match s.text_source {
        TextSource::Embedded => "embedded text layer",
        TextSource::Ocr => "OCR",
    };
    eprintln!();
    eprintln!(
        "{} {} via {}  {}",
        green("✔"),
        bold(&format!("{} lines / {} words", s.text_lines, s.text_words)),
        source,
        dim(&format!("{}ms", s.total_duration_ms)),
    );
    if let Some(id) = stored_id {
        eprintln!("   {}", dim(&format!("stored as record #{id}")));
    }
    for d in &output.degradations {
        eprintln!("  {} {}: {}", cyan("⚠"), d.stage, d.error);
    }
}

fn print_field(label: &str, value: &str) {
    if value.is_empty() {
        println!("  {:<16} {}", label, dim("-"));
    } else {
        println!("  {:<16} {}", label, value);
    }
}

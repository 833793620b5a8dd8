//! # bankscan
//!
//! Extract structured banking fields from scanned checks and statements.
//!
//! ## Why this crate?
//!
//! Bank documents arrive as scans. When a PDF carries an embedded text
//! layer, that layer is the fastest and most accurate source — so the
//! pipeline always tries it first and falls back to OCR only when the layer
//! is missing or too short to be the document. On the OCR path the MICR
//! band at the bottom of a check gets its own crop and digit-whitelisted
//! recognition passes, because a page-level pass reliably garbles E-13B
//! glyphs that a constrained pass reads cleanly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PDF or image)
//!  │
//!  ├─ 1. Classify   magic-byte sniff: PDF vs raster image
//!  ├─ 2. Direct     embedded PDF text layer; long enough? OCR is skipped
//!  ├─ 3. Raster     pdftoppm → per-page PNGs (OCR path only)
//!  ├─ 4. Normalize  rotate / capped downscale / greyscale + contrast
//!  ├─ 5. Recognize  tesseract page pass + dual digit-only MICR band passes
//!  ├─ 6. Parse      routing / account / check from the MICR digit stream
//!  └─ 7. Fields     ordered pattern tables over the transcript + MICR merge
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bankscan::{extract, ExtractionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let output = extract(Path::new("check.pdf"), &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!("source: {:?}, {} ms",
//!         output.stats.text_source,
//!         output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bankscan` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding only the library:
//! ```toml
//! bankscan = { version = "0.3", default-features = false }
//! ```
//!
//! ## HTTP API
//!
//! `bankscan --serve` (or [`api::start_server`]) exposes the pipeline and
//! the SQLite record store:
//!
//! | Method | Route | Purpose |
//! |--------|-------|---------|
//! | `GET`  | `/health` | liveness probe |
//! | `POST` | `/api/v1/checks/extract` | multipart extract + persist, one round trip |
//! | `GET`  | `/api/v1/checks` | paged listing (`search`, `sort`, `order`, `page`, `perPage`) |
//! | `GET`/`PUT` | `/api/v1/checks/{id}` | read / manually edit one record |
//! | `GET`  | `/api/v1/history` | every record, newest first, bare array |
//! | `POST` | `/api/v1/uploads` | async intake, returns a pollable job id |
//! | `GET`  | `/api/v1/uploads/{id}` | job status: processing / verified / manual_review / failed |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod record;
pub mod run;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{build_router, start_server, ApiState};
pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{Degradation, ExtractError, StepError, StoreError};
pub use extract::{extract, extract_with};
pub use record::{
    ExtractedRecord, ExtractionOutput, ExtractionStats, MicrNumbers, RecordFields, TextSource,
};
pub use store::{ListQuery, RecordPage, RecordStore, SortOrder, StoredRecord};

//! Error types for the bankscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the extraction cannot proceed at all
//!   (missing upload, empty file, rasterizer failure). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions. No record
//!   is produced and nothing is persisted.
//!
//! * [`StepError`] — **Non-fatal**: a single preprocessing or recognition
//!   step failed (unreadable intermediate image, OCR engine error) but the
//!   run continues with that step's contribution degraded to nothing. Each
//!   occurrence is recorded as a [`Degradation`] on the run and returned in
//!   [`crate::ExtractionOutput`], so "best effort" never means "silent".
//!
//! The separation lets callers decide their own tolerance: treat any
//! degradation as a reason for manual review, or accept whatever fields
//! survived.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bankscan library.
///
/// Step-level failures use [`StepError`] and are carried in
/// [`crate::ExtractionOutput::degradations`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No document was supplied at all.
    #[error("No file received.\nAttach the document as multipart field 'file'.")]
    UploadMissing,

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is zero bytes long.
    #[error("Uploaded file is empty: '{path}'")]
    EmptyUpload { path: PathBuf },

    /// The file is neither a PDF nor a raster image we can decode.
    #[error(
        "Unsupported document format: '{path}'\nFirst bytes: {magic:?}\n\
         Expected a PDF or a PNG/JPEG/TIFF/BMP image."
    )]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The external PDF converter binary is not installed or not on PATH.
    #[error(
        "PDF converter '{converter}' not found.\n\
         Install poppler-utils (e.g. `apt install poppler-utils`) or point\n\
         the converter path at an equivalent binary."
    )]
    ConverterNotFound { converter: String },

    /// The external converter ran but exited non-zero.
    #[error("PDF rasterisation failed ({status}): {stderr}")]
    ConverterFailed { status: String, stderr: String },

    /// The converter exited cleanly yet wrote no page images.
    ///
    /// Treated as a failure even without a reported error: an OCR run with
    /// zero pages would silently produce an all-empty record.
    #[error(
        "Converter exited cleanly but produced no page images in '{dir}'\n\
         The PDF may be empty or corrupt."
    )]
    NoPagesProduced { dir: PathBuf },

    // ── Run plumbing ──────────────────────────────────────────────────────
    /// Could not create the per-run scratch directory.
    #[error("Failed to create scratch directory: {source}")]
    Scratch {
        #[source]
        source: std::io::Error,
    },

    /// Reading the input document failed for a reason other than the above.
    #[error("Failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single pipeline step.
///
/// Stored in [`Degradation`] entries on the run; the extraction continues
/// with the step's output degraded (original path passed through, or empty
/// recognized text).
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StepError {
    /// An intermediate image was missing, zero-byte, or undecodable.
    #[error("image '{path}' could not be loaded: {detail}")]
    ImageLoad { path: String, detail: String },

    /// One OCR attempt failed; it contributes an empty string.
    #[error("recognition attempt ({mode}) failed: {detail}")]
    Recognition { mode: String, detail: String },

    /// The embedded text layer could not be read (scanned-only PDF, or a
    /// parser error). The run falls through to the OCR path.
    #[error("embedded text layer unreadable: {detail}")]
    EmbeddedText { detail: String },
}

/// One recovered failure, tagged with the pipeline stage that absorbed it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Degradation {
    /// Stage name, e.g. "downscale", "micr-line-pass".
    pub stage: String,
    /// What went wrong.
    pub error: StepError,
}

impl Degradation {
    pub fn new(stage: impl Into<String>, error: StepError) -> Self {
        Self {
            stage: stage.into(),
            error,
        }
    }
}

/// Errors from the persistence store.
///
/// Kept separate from [`ExtractError`] on purpose: extraction success is
/// independent of persistence success, and the API layer returns extracted
/// fields even when the write fails.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or create the database file.
    #[error("Failed to open database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite-level failure (schema, insert, query).
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_not_found_mentions_poppler() {
        let e = ExtractError::ConverterNotFound {
            converter: "pdftoppm".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pdftoppm"), "got: {msg}");
        assert!(msg.contains("poppler-utils"), "got: {msg}");
    }

    #[test]
    fn no_pages_produced_display() {
        let e = ExtractError::NoPagesProduced {
            dir: PathBuf::from("/tmp/run-1"),
        };
        assert!(e.to_string().contains("/tmp/run-1"));
        assert!(e.to_string().contains("no page images"));
    }

    #[test]
    fn unsupported_format_shows_magic() {
        let e = ExtractError::UnsupportedFormat {
            path: PathBuf::from("x.bin"),
            magic: [0x4d, 0x5a, 0x00, 0x01],
        };
        assert!(e.to_string().contains("x.bin"));
        assert!(e.to_string().contains("77")); // 0x4d rendered by Debug
    }

    #[test]
    fn step_error_serializes() {
        let e = StepError::Recognition {
            mode: "micr-line".into(),
            detail: "exit status 1".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("micr-line"));
    }

    #[test]
    fn degradation_round_trips() {
        let d = Degradation::new(
            "preprocess",
            StepError::ImageLoad {
                path: "page-001.png".into(),
                detail: "zero-byte file".into(),
            },
        );
        let json = serde_json::to_string(&d).unwrap();
        let back: Degradation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage, "preprocess");
    }
}

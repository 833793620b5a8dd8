//! Output types: the extracted field record, MICR numbers, and run stats.
//!
//! ## Why "empty string", not `Option`?
//!
//! Every field of [`ExtractedRecord`] defaults to `""` and is never null on
//! the wire. Downstream consumers (store, API clients, search) index and
//! render these fields without null checks, and an absent value compares,
//! sorts, and serializes exactly like any other string. `Option<String>`
//! would force the entire consumer chain to re-handle a distinction the
//! domain does not have — "we did not find it" is simply the empty value.

use crate::error::Degradation;
use serde::{Deserialize, Serialize};

/// The normalized record produced by one extraction run.
///
/// Created once per successful pipeline run; immutable afterwards except
/// through the manual-edit API path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedRecord {
    pub account_name: String,
    pub account_number: String,
    pub routing_number: String,
    pub check_number: String,
    /// Indian bank branch code (four letters, a zero, six alphanumerics).
    pub ifsc: String,
    pub bank_name: String,
    pub branch: String,
    /// Full transcript: embedded text layer, or OCR output on the fallback path.
    pub raw_text: String,
    /// Collapsed digit stream recognized from the MICR band. Empty when the
    /// direct-text path was taken. Returned to clients, never persisted.
    pub raw_micr: String,
    /// Server-assigned at persist time; empty until the record is stored.
    pub created_at: String,
}

impl ExtractedRecord {
    /// Narrow view used by the API envelope: the seven banking fields,
    /// without the transcript/MICR siblings.
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            account_name: self.account_name.clone(),
            account_number: self.account_number.clone(),
            routing_number: self.routing_number.clone(),
            check_number: self.check_number.clone(),
            ifsc: self.ifsc.clone(),
            bank_name: self.bank_name.clone(),
            branch: self.branch.clone(),
        }
    }

    /// Whether the two numbers every downstream consumer cares about are
    /// present. Drives the verified / manual-review split on async uploads.
    pub fn has_core_numbers(&self) -> bool {
        !self.routing_number.is_empty() && !self.account_number.is_empty()
    }
}

/// The seven banking fields, minus transcript and MICR stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordFields {
    pub account_name: String,
    pub account_number: String,
    pub routing_number: String,
    pub check_number: String,
    pub ifsc: String,
    pub bank_name: String,
    pub branch: String,
}

/// Numbers parsed out of the MICR band's digit stream.
///
/// All empty when the band produced nothing recognizable. `raw` keeps the
/// cleaned digit stream for diagnosis and for the API's `micr` sibling key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MicrNumbers {
    pub routing: String,
    pub account: String,
    pub check_number: String,
    pub raw: String,
}

impl MicrNumbers {
    pub fn is_empty(&self) -> bool {
        self.routing.is_empty() && self.account.is_empty() && self.check_number.is_empty()
    }
}

/// Which source produced the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    /// Embedded PDF text layer was long enough; OCR never ran.
    Embedded,
    /// OCR sub-pipeline produced the transcript.
    Ocr,
}

/// Statistics for a completed extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    /// Unique id of the run that produced this output.
    pub run_id: String,
    pub text_source: TextSource,
    /// Characters found in the embedded text layer (before the threshold gate).
    pub embedded_chars: usize,
    /// Pages the OCR sub-pipeline processed (0 on the direct path).
    pub ocr_pages: usize,
    /// Transcript shape, as shown in the viewer's stats panel.
    pub text_lines: usize,
    pub text_words: usize,
    pub text_chars: usize,
    pub total_duration_ms: u64,
    /// Time spent in the external rasteriser (0 on the direct path).
    pub raster_duration_ms: u64,
    /// Time spent in recognition passes (0 on the direct path).
    pub recognition_duration_ms: u64,
}

/// Everything one run returns: the record, how it went, and what degraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub record: ExtractedRecord,
    pub stats: ExtractionStats,
    /// Recovered per-step failures, in occurrence order. Empty on a clean run.
    pub degradations: Vec<Degradation>,
}

/// Count lines/words/chars the same way the viewer's stats tab does.
pub(crate) fn text_shape(text: &str) -> (usize, usize, usize) {
    let lines = if text.is_empty() {
        0
    } else {
        text.lines().count()
    };
    let words = text.split_whitespace().count();
    (lines, words, text.chars().count())
}

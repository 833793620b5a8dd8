//! Wire types for the HTTP surface.
//!
//! Bodies keep the envelope the viewer has always consumed: a `success`
//! flag wrapping camelCase payloads. The upload-job types back the async
//! intake path; jobs are coordination state only and live in process
//! memory, so a restart forgets them and the client re-uploads.

use crate::record::{ExtractedRecord, MicrNumbers, RecordFields};
use crate::store::StoredRecord;
use serde::{Deserialize, Serialize};

/// Liveness probe body.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// Envelope for the synchronous extract endpoint.
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub data: ExtractData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of [`ExtractResponse`]: the stored row id (absent when the
/// write failed), the seven fields, the MICR numbers, and the transcript.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub fields: RecordFields,
    pub micr: MicrNumbers,
    pub raw_text: String,
}

/// Envelope for the paged listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<StoredRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Envelope for single-record reads and updates.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    pub data: StoredRecord,
}

/// Error body shared by every endpoint. 404s carry the bare
/// `{ "success": false }` shape; everything else names a reason.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    pub fn bare() -> Self {
        Self {
            success: false,
            error: None,
        }
    }
}

/// Partial update body for the manual-edit path.
///
/// Absent keys leave the stored value untouched; an explicit empty string
/// clears a field. Transcript and timestamp are not editable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub check_number: Option<String>,
    pub ifsc: Option<String>,
    pub bank_name: Option<String>,
    pub branch: Option<String>,
}

impl RecordPatch {
    /// Overlay this patch on the currently stored values.
    pub fn apply(&self, current: &StoredRecord) -> RecordFields {
        fn pick(patch: &Option<String>, current: &str) -> String {
            patch.clone().unwrap_or_else(|| current.to_string())
        }
        RecordFields {
            account_name: pick(&self.account_name, &current.account_name),
            account_number: pick(&self.account_number, &current.account_number),
            routing_number: pick(&self.routing_number, &current.routing_number),
            check_number: pick(&self.check_number, &current.check_number),
            ifsc: pick(&self.ifsc, &current.ifsc),
            bank_name: pick(&self.bank_name, &current.bank_name),
            branch: pick(&self.branch, &current.branch),
        }
    }
}

/// Lifecycle of one asynchronous upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Processing,
    /// Routing and account numbers both present; no human review needed.
    Verified,
    /// Extraction finished but a core number is missing.
    ManualReview,
    Failed,
}

/// One async intake job, as returned by the accept and poll endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UploadJob {
    pub id: String,
    pub status: UploadStatus,
    /// Full record once the pipeline finished; `null` while processing.
    pub extracted: Option<ExtractedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

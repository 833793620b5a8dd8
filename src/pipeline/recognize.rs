//! Text recognition via the `tesseract` CLI.
//!
//! ## Why shell out instead of binding libtesseract?
//!
//! The CLI is what ships in every distro package, upgrades independently of
//! this crate, and crashes in its own process when a scan is pathological.
//! We pay one process spawn per pass, which is noise next to the raster and
//! recognition cost itself.
//!
//! Recognition failures are per-step: a dead engine degrades the run (empty
//! text, fields stay blank) rather than failing it, so the document still
//! lands in the store for manual review.

use crate::error::{Degradation, StepError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// How a recognition pass should read the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Single text line, digits only. First MICR pass; best when the band
    /// crop landed cleanly on the E-13B line.
    MicrLine,
    /// Uniform block, digits only. Second MICR pass; catches bands where
    /// the crop picked up a second line of trailing print.
    MicrBlock,
    /// Uniform block, unconstrained charset. Full-page body text.
    Page,
}

impl RecognitionMode {
    /// Tesseract page-segmentation mode for this pass.
    fn psm(self) -> u32 {
        match self {
            RecognitionMode::MicrLine => 7,
            RecognitionMode::MicrBlock => 6,
            RecognitionMode::Page => 6,
        }
    }

    /// Character whitelist, if the pass is digits-only.
    fn whitelist(self) -> Option<&'static str> {
        match self {
            RecognitionMode::MicrLine | RecognitionMode::MicrBlock => Some("0123456789"),
            RecognitionMode::Page => None,
        }
    }

    /// Stable name used in logs and degradation records.
    pub fn label(self) -> &'static str {
        match self {
            RecognitionMode::MicrLine => "micr-line-pass",
            RecognitionMode::MicrBlock => "micr-block-pass",
            RecognitionMode::Page => "page-recognition",
        }
    }
}

/// A text recognition engine. Implemented by the tesseract wrapper in
/// production and by scripted fakes in tests.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Read `image` under the given mode, returning the raw engine output.
    async fn recognize(&self, image: &Path, mode: RecognitionMode) -> Result<String, StepError>;
}

/// [`TextRecognizer`] backed by the `tesseract` command-line binary.
pub struct TesseractRecognizer {
    engine: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(engine: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            language: language.into(),
        }
    }

    fn command_args(&self, image: &Path, mode: RecognitionMode) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            image.as_os_str().to_os_string(),
            "stdout".into(),
            "-l".into(),
            self.language.clone().into(),
            "--psm".into(),
            mode.psm().to_string().into(),
        ];
        if let Some(charset) = mode.whitelist() {
            args.push("-c".into());
            args.push(format!("tessedit_char_whitelist={charset}").into());
        }
        args
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &Path, mode: RecognitionMode) -> Result<String, StepError> {
        let output = Command::new(&self.engine)
            .args(self.command_args(image, mode))
            .output()
            .await
            .map_err(|e| {
                let detail = if e.kind() == std::io::ErrorKind::NotFound {
                    format!(
                        "'{}' not found. Install tesseract-ocr (e.g. `apt install \
                         tesseract-ocr` or `brew install tesseract`) or point \
                         engine_path at the binary.",
                        self.engine
                    )
                } else {
                    format!("failed to start '{}': {e}", self.engine)
                };
                StepError::Recognition {
                    mode: mode.label().to_string(),
                    detail,
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StepError::Recognition {
                mode: mode.label().to_string(),
                detail: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            mode = mode.label(),
            image = %image.display(),
            chars = text.len(),
            "recognition pass complete"
        );
        Ok(text)
    }
}

/// Run both MICR passes over the band crop and concatenate what survived.
///
/// The line pass and the block pass disagree often enough on real scans
/// that we keep both outputs and let the parser's token scan sort it out.
/// A failed pass contributes nothing and is recorded as a degradation;
/// only both passes failing yields an empty band text.
pub async fn read_micr_band(
    recognizer: &dyn TextRecognizer,
    band: &Path,
) -> (String, Vec<Degradation>) {
    let mut pieces: Vec<String> = Vec::new();
    let mut degradations = Vec::new();

    for mode in [RecognitionMode::MicrLine, RecognitionMode::MicrBlock] {
        match recognizer.recognize(band, mode).await {
            Ok(text) => pieces.push(text),
            Err(err) => degradations.push(Degradation::new(mode.label(), err)),
        }
    }

    (pieces.join(" "), degradations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<VecDeque<Result<String, StepError>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, StepError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl TextRecognizer for Scripted {
        async fn recognize(
            &self,
            _image: &Path,
            _mode: RecognitionMode,
        ) -> Result<String, StepError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted recognizer ran out of responses")
        }
    }

    fn pass_failure(mode: RecognitionMode) -> StepError {
        StepError::Recognition {
            mode: mode.label().to_string(),
            detail: "boom".to_string(),
        }
    }

    #[test]
    fn micr_modes_are_digit_whitelisted() {
        assert_eq!(RecognitionMode::MicrLine.psm(), 7);
        assert_eq!(RecognitionMode::MicrBlock.psm(), 6);
        assert_eq!(RecognitionMode::MicrLine.whitelist(), Some("0123456789"));
        assert_eq!(RecognitionMode::MicrBlock.whitelist(), Some("0123456789"));
        assert_eq!(RecognitionMode::Page.psm(), 6);
        assert_eq!(RecognitionMode::Page.whitelist(), None);
    }

    #[test]
    fn command_args_include_whitelist_for_micr_only() {
        let rec = TesseractRecognizer::new("tesseract", "eng");
        let micr = rec.command_args(Path::new("band.png"), RecognitionMode::MicrLine);
        assert!(micr.contains(&OsString::from("--psm")));
        assert!(micr.contains(&OsString::from("7")));
        assert!(micr.contains(&OsString::from("tessedit_char_whitelist=0123456789")));

        let page = rec.command_args(Path::new("page.png"), RecognitionMode::Page);
        assert!(page.contains(&OsString::from("6")));
        assert!(!page
            .iter()
            .any(|a| a.to_string_lossy().contains("whitelist")));
    }

    #[tokio::test]
    async fn missing_engine_reports_install_hint() {
        let rec = TesseractRecognizer::new("definitely-not-a-real-engine-xyz", "eng");
        let err = rec
            .recognize(Path::new("band.png"), RecognitionMode::MicrLine)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tesseract-ocr"), "got: {err}");
    }

    #[tokio::test]
    async fn band_read_concatenates_both_passes() {
        let rec = Scripted::new(vec![
            Ok("021000021 1234567890".to_string()),
            Ok("0456".to_string()),
        ]);
        let (text, degradations) = read_micr_band(&rec, Path::new("band.png")).await;
        assert_eq!(text, "021000021 1234567890 0456");
        assert!(degradations.is_empty());
    }

    #[tokio::test]
    async fn band_read_survives_one_failed_pass() {
        let rec = Scripted::new(vec![
            Err(pass_failure(RecognitionMode::MicrLine)),
            Ok("021000021".to_string()),
        ]);
        let (text, degradations) = read_micr_band(&rec, Path::new("band.png")).await;
        assert_eq!(text, "021000021");
        assert_eq!(degradations.len(), 1);
        assert_eq!(degradations[0].stage, "micr-line-pass");
    }

    #[tokio::test]
    async fn band_read_with_both_passes_down_is_empty() {
        let rec = Scripted::new(vec![
            Err(pass_failure(RecognitionMode::MicrLine)),
            Err(pass_failure(RecognitionMode::MicrBlock)),
        ]);
        let (text, degradations) = read_micr_band(&rec, Path::new("band.png")).await;
        assert!(text.is_empty());
        assert_eq!(degradations.len(), 2);
    }
}

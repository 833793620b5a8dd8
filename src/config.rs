//! Configuration types for the extraction pipeline.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across requests, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field. The
//! builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ExtractError;

/// Configuration for one extraction pipeline.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use bankscan::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .ocr_language("eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Rasterisation DPI for PDF pages. Range: 100–600. Default: 200.
    ///
    /// 200 DPI is the sweet spot for check stock: MICR glyphs stay crisp
    /// enough for digit recognition while a letter-size page rasterises in
    /// well under a second. Raise to 300 for small-font statements; going
    /// beyond that mostly buys larger intermediates, not accuracy.
    pub dpi: u32,

    /// Maximum working-image width in pixels. Default: 1200.
    ///
    /// Pages wider than this are downscaled proportionally before
    /// recognition — OCR time grows with pixel count and check fields are
    /// comfortably legible at 1200 px. Images are never upscaled: blurry
    /// enlargement only invents edges the recognizer then misreads.
    pub target_width: u32,

    /// Contrast boost applied to the full page after greyscale + level
    /// stretch, in the range 0.0–1.0. Default: 0.6.
    pub body_contrast: f32,

    /// Contrast boost for the cropped MICR band. Default: 0.7.
    ///
    /// Deliberately stronger than [`body_contrast`](Self::body_contrast):
    /// MICR ink is printed high-contrast by design, so pushing it harder
    /// separates the glyphs from scanner noise without destroying them the
    /// way it would ordinary body text.
    pub micr_contrast: f32,

    /// Fraction of page height taken as the MICR band. Default: 0.14.
    pub micr_band_ratio: f32,

    /// Minimum MICR band height in pixels, applied after the ratio. Default: 40.
    pub micr_min_band_px: u32,

    /// Embedded-text length (characters, after trimming) at or above which
    /// the direct-text path is considered sufficient and OCR is skipped.
    /// Default: 20.
    ///
    /// This is a correctness-relevant constant, not a tuning detail: too low
    /// accepts extraction garbage (a stray "Page 1" artifact) as the
    /// document text; too high forces needless OCR on legitimately short
    /// documents.
    pub min_embedded_chars: usize,

    /// How many rasterised pages the OCR sub-pipeline processes. Default: 1.
    ///
    /// Checks are single-page; the fields of a multi-page statement live on
    /// its first page too. Raising this multiplies recognition cost per run.
    pub ocr_page_limit: usize,

    /// Recognition language passed to the OCR engine. Default: "eng".
    pub ocr_language: String,

    /// PDF-to-image converter binary. Default: "pdftoppm" (resolved via PATH).
    pub converter_path: String,

    /// OCR engine binary. Default: "tesseract" (resolved via PATH).
    pub engine_path: String,

    /// Keep the per-run scratch directory (rasterised pages, normalized
    /// copies, MICR crops) instead of removing it when the run ends.
    /// Default: false.
    pub keep_artifacts: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            target_width: 1200,
            body_contrast: 0.6,
            micr_contrast: 0.7,
            micr_band_ratio: 0.14,
            micr_min_band_px: 40,
            min_embedded_chars: 20,
            ocr_page_limit: 1,
            ocr_language: "eng".to_string(),
            converter_path: "pdftoppm".to_string(),
            engine_path: "tesseract".to_string(),
            keep_artifacts: false,
        }
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(100, 600);
        self
    }

    pub fn target_width(mut self, px: u32) -> Self {
        self.config.target_width = px.max(200);
        self
    }

    pub fn body_contrast(mut self, c: f32) -> Self {
        self.config.body_contrast = c.clamp(0.0, 1.0);
        self
    }

    pub fn micr_contrast(mut self, c: f32) -> Self {
        self.config.micr_contrast = c.clamp(0.0, 1.0);
        self
    }

    pub fn micr_band_ratio(mut self, r: f32) -> Self {
        self.config.micr_band_ratio = r.clamp(0.02, 0.5);
        self
    }

    pub fn micr_min_band_px(mut self, px: u32) -> Self {
        self.config.micr_min_band_px = px.max(1);
        self
    }

    pub fn min_embedded_chars(mut self, n: usize) -> Self {
        self.config.min_embedded_chars = n;
        self
    }

    pub fn ocr_page_limit(mut self, n: usize) -> Self {
        self.config.ocr_page_limit = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn converter_path(mut self, path: impl Into<String>) -> Self {
        self.config.converter_path = path.into();
        self
    }

    pub fn engine_path(mut self, path: impl Into<String>) -> Self {
        self.config.engine_path = path.into();
        self
    }

    pub fn keep_artifacts(mut self, v: bool) -> Self {
        self.config.keep_artifacts = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 100 || c.dpi > 600 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 100–600, got {}",
                c.dpi
            )));
        }
        if !(0.02..=0.5).contains(&c.micr_band_ratio) {
            return Err(ExtractError::InvalidConfig(format!(
                "MICR band ratio must be 0.02–0.5, got {}",
                c.micr_band_ratio
            )));
        }
        if c.ocr_page_limit == 0 {
            return Err(ExtractError::InvalidConfig(
                "OCR page limit must be ≥ 1".into(),
            ));
        }
        if c.ocr_language.is_empty()
            || !c
                .ocr_language
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '+')
        {
            return Err(ExtractError::InvalidConfig(format!(
                "OCR language must be a tesseract language code (e.g. \"eng\", \"eng+hin\"), got {:?}",
                c.ocr_language
            )));
        }
        if c.converter_path.is_empty() || c.engine_path.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "converter and engine paths must be non-empty".into(),
            ));
        }
        Ok(self.config)
    }
}

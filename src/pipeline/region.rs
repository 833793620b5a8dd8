//! MICR band isolation.
//!
//! The E-13B line sits along the bottom edge of US check stock, so instead
//! of detecting it we crop a fixed-ratio strip: the bottom `micr_band_ratio`
//! of the page height, full width, with a floor of `micr_min_band_px` pixels
//! so low-resolution rasters still hand the recognizer something legible.
//! The crop gets a stronger contrast boost than the body pass because the
//! magnetic ink prints darker than the surrounding text.

use crate::config::ExtractionConfig;
use crate::error::StepError;
use crate::pipeline::normalize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Crop the bottom band of `path` and write it as `*_micr.png`.
///
/// The band height is `max(micr_min_band_px, floor(height * micr_band_ratio))`,
/// clamped to the page height so a tiny image yields itself rather than an
/// out-of-bounds crop.
pub async fn crop_micr_band(path: &Path, config: &ExtractionConfig) -> Result<PathBuf, StepError> {
    let path = path.to_path_buf();
    let ratio = config.micr_band_ratio;
    let min_px = config.micr_min_band_px;
    let contrast = config.micr_contrast;
    tokio::task::spawn_blocking(move || crop_sync(&path, ratio, min_px, contrast))
        .await
        .unwrap_or_else(|e| {
            Err(StepError::ImageLoad {
                path: "micr band".to_string(),
                detail: format!("blocking task failed: {e}"),
            })
        })
}

fn crop_sync(path: &Path, ratio: f32, min_px: u32, contrast: f32) -> Result<PathBuf, StepError> {
    let img = normalize::load(path)?;
    let (w, h) = (img.width(), img.height());

    let band_h = band_height(h, ratio, min_px);
    let y = h - band_h;
    let band = img.crop_imm(0, y, w, band_h);

    let out = normalize::derived_path(path, "micr");
    normalize::save(&normalize::boost(band, contrast), &out)?;
    debug!(
        page_h = h,
        band_h,
        path = %out.display(),
        "cropped MICR band"
    );
    Ok(out)
}

fn band_height(page_h: u32, ratio: f32, min_px: u32) -> u32 {
    let proportional = (page_h as f32 * ratio).floor() as u32;
    proportional.max(min_px).min(page_h)
}

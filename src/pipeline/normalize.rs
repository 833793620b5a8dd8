//! Image normalisation: orientation fix, capped downscale, and the
//! greyscale + level-stretch + contrast treatment the recognizer wants.
//!
//! Every step writes a **new** file with a derived suffix (`_rot`, `_down`,
//! `_prep`) instead of mutating its input, so each intermediate stays on disk
//! for inspection while the run's scratch directory lives. Every step is
//! also individually skippable: a missing/zero-byte/corrupt image degrades
//! that one step (the caller keeps the previous path and records the
//! degradation) rather than failing the run.
//!
//! CPU-bound pixel work runs under `spawn_blocking` so a big scan does not
//! stall the async executor serving other requests.

use crate::error::StepError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rotate 90° when the page is taller than wide.
///
/// Check stock is landscape; a portrait-oriented scan is almost always a
/// sideways feed. This is a coarse heuristic, not deskew.
pub async fn orient(path: &Path) -> Result<PathBuf, StepError> {
    let path = path.to_path_buf();
    run_blocking(path.clone(), move || orient_sync(&path)).await
}

fn orient_sync(path: &Path) -> Result<PathBuf, StepError> {
    let img = load(path)?;
    if img.height() <= img.width() {
        return Ok(path.to_path_buf());
    }

    let out = derived_path(path, "rot");
    let rotated = img.rotate90();
    save(&rotated, &out)?;
    debug!(from = %path.display(), to = %out.display(), "rotated portrait page");
    Ok(out)
}

/// Downscale proportionally when wider than `target_width`. Never upscales.
pub async fn downscale(path: &Path, target_width: u32) -> Result<PathBuf, StepError> {
    let path = path.to_path_buf();
    run_blocking(path.clone(), move || downscale_sync(&path, target_width)).await
}

fn downscale_sync(path: &Path, target_width: u32) -> Result<PathBuf, StepError> {
    let img = load(path)?;
    let (w, h) = (img.width(), img.height());
    if w <= target_width {
        return Ok(path.to_path_buf());
    }

    let new_h = ((h as u64 * target_width as u64) / w as u64).max(1) as u32;
    let resized = img.resize_exact(target_width, new_h, FilterType::Triangle);

    let out = derived_path(path, "down");
    save(&resized, &out)?;
    debug!(
        from_px = w,
        to_px = target_width,
        path = %out.display(),
        "downscaled page"
    );
    Ok(out)
}

/// Greyscale + level stretch + contrast boost; writes `_prep.png`.
///
/// This is the copy the full-page recognition pass reads. Unlike the
/// geometry steps, a failure here means the page contributes no body text,
/// so the caller skips recognition for it instead of passing the raw page
/// through.
pub async fn preprocess(path: &Path, contrast: f32) -> Result<PathBuf, StepError> {
    let path = path.to_path_buf();
    run_blocking(path.clone(), move || preprocess_sync(&path, contrast)).await
}

fn preprocess_sync(path: &Path, contrast: f32) -> Result<PathBuf, StepError> {
    let img = load(path)?;
    let out = derived_path(path, "prep");
    save(&boost(img, contrast), &out)?;
    Ok(out)
}

// ── Shared helpers (also used by the MICR band crop) ─────────────────────────

/// Load an image, degrading on anything unreadable.
pub(crate) fn load(path: &Path) -> Result<DynamicImage, StepError> {
    let meta = std::fs::metadata(path).map_err(|e| StepError::ImageLoad {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    if meta.len() == 0 {
        return Err(StepError::ImageLoad {
            path: path.display().to_string(),
            detail: "zero-byte file".to_string(),
        });
    }

    // Sniff the format from content; uploads often carry the wrong extension.
    let img = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| StepError::ImageLoad {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?
        .decode()
        .map_err(|e| StepError::ImageLoad {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(StepError::ImageLoad {
            path: path.display().to_string(),
            detail: "image has zero dimensions".to_string(),
        });
    }
    Ok(img)
}

pub(crate) fn save(img: &DynamicImage, out: &Path) -> Result<(), StepError> {
    img.save(out).map_err(|e| StepError::ImageLoad {
        path: out.display().to_string(),
        detail: format!("save failed: {e}"),
    })
}

/// `page-1.png` + "prep" → `page-1_prep.png`, next to the input.
pub(crate) fn derived_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    match path.parent() {
        Some(parent) => parent.join(format!("{stem}_{suffix}.png")),
        None => PathBuf::from(format!("{stem}_{suffix}.png")),
    }
}

/// Greyscale, stretch levels to the full 0–255 range, then boost contrast.
///
/// The stretch makes the later fixed contrast delta behave the same on dim
/// and bright scans; without it a washed-out scan would need a different
/// boost than a dark one.
pub(crate) fn boost(img: DynamicImage, contrast: f32) -> DynamicImage {
    let grey = stretch_levels(&img.to_luma8());
    // Config carries the boost as 0..1; adjust_contrast takes percent-style units.
    DynamicImage::ImageLuma8(grey).adjust_contrast(contrast * 100.0)
}

/// Map the darkest pixel to 0 and the brightest to 255, scaling linearly.
fn stretch_levels(image: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }

    // Flat image: nothing to stretch.
    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = ((value.saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

async fn run_blocking<F>(path: PathBuf, f: F) -> Result<PathBuf, StepError>
where
    F: FnOnce() -> Result<PathBuf, StepError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| {
            Err(StepError::ImageLoad {
                path: path.display().to_string(),
                detail: format!("blocking task failed: {e}"),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn write_grey(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let img = GrayImage::from_fn(w, h, |x, y| Luma([((x + y) % 200 + 30) as u8]));
        let path = dir.join(name);
        DynamicImage::ImageLuma8(img).save(&path).unwrap();
        path
    }

    #[test]
    fn derived_path_appends_suffix() {
        assert_eq!(
            derived_path(Path::new("/scratch/page-1.png"), "prep"),
            PathBuf::from("/scratch/page-1_prep.png")
        );
        assert_eq!(
            derived_path(Path::new("/scratch/scan.jpeg"), "down"),
            PathBuf::from("/scratch/scan_down.png")
        );
    }

    #[test]
    fn orient_rotates_portrait_only() {
        let dir = tempfile::tempdir().unwrap();
        let portrait = write_grey(dir.path(), "p.png", 100, 300);
        let out = orient_sync(&portrait).unwrap();
        assert_ne!(out, portrait);
        let rotated = image::open(&out).unwrap();
        assert_eq!((rotated.width(), rotated.height()), (300, 100));

        let landscape = write_grey(dir.path(), "l.png", 300, 100);
        assert_eq!(orient_sync(&landscape).unwrap(), landscape);
    }

    #[test]
    fn downscale_caps_width_and_keeps_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let big = write_grey(dir.path(), "big.png", 2400, 1200);
        let out = downscale_sync(&big, 1200).unwrap();
        let scaled = image::open(&out).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (1200, 600));
    }

    #[test]
    fn downscale_never_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_grey(dir.path(), "small.png", 800, 400);
        assert_eq!(downscale_sync(&small, 1200).unwrap(), small);
    }

    #[test]
    fn preprocess_writes_prep_copy() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_grey(dir.path(), "page-1.png", 200, 100);
        let out = preprocess_sync(&page, 0.6).unwrap();
        assert!(out.to_str().unwrap().ends_with("page-1_prep.png"));
        assert!(page.exists(), "input must not be mutated or removed");
        let prep = image::open(&out).unwrap();
        assert_eq!((prep.width(), prep.height()), (200, 100));
    }

    #[test]
    fn missing_image_degrades_not_panics() {
        let err = preprocess_sync(Path::new("/nope/missing.png"), 0.6).unwrap_err();
        match err {
            StepError::ImageLoad { .. } => {}
            other => panic!("expected ImageLoad, got {other:?}"),
        }
    }

    #[test]
    fn zero_byte_image_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.png");
        std::fs::write(&p, b"").unwrap();
        let err = orient_sync(&p).unwrap_err();
        assert!(err.to_string().contains("zero-byte"));
    }

    #[test]
    fn stretch_levels_expands_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + (x as u8) * 10]));
        let stretched = stretch_levels(&img);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn stretch_levels_flat_image_unchanged() {
        let img = GrayImage::from_pixel(3, 3, Luma([128]));
        let stretched = stretch_levels(&img);
        assert!(stretched.pixels().all(|p| p[0] == 128));
    }
}

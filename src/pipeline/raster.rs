//! Rasterisation: PDF → ordered page images via an external converter.
//!
//! ## Why an external process?
//!
//! Rasterising arbitrary PDFs is exactly the kind of work that should not
//! share an address space with a long-running service: poppler's `pdftoppm`
//! is battle-tested, crashes in isolation, and writes plain PNG files we can
//! inspect afterwards. The cost is process-spawn latency, which is noise
//! next to the OCR passes that follow.
//!
//! ## Why a trait?
//!
//! [`Rasterizer`] is the seam that makes the pipeline testable without
//! poppler installed: tests inject a fake that writes synthetic page images
//! (or counts invocations to prove the OCR path never ran). Production code
//! uses [`PdftoppmRasterizer`].

use crate::error::ExtractError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Capability interface for PDF rasterisation.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Rasterise `pdf` into `out_dir` at `dpi`.
    ///
    /// Returns the page image paths in page order. Must fail when the
    /// converter exits non-zero **or** when it exits cleanly without
    /// producing a single page image.
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}

/// Production rasteriser shelling out to poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    converter: String,
}

impl PdftoppmRasterizer {
    pub fn new(converter: impl Into<String>) -> Self {
        Self {
            converter: converter.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        // pdftoppm writes <root>-N.png, zero-padding N to the width of the
        // final page number, so lexical order equals page order.
        let root = out_dir.join("page");

        debug!(
            pdf = %pdf.display(),
            out = %out_dir.display(),
            dpi,
            "invoking {}",
            self.converter
        );

        let output = Command::new(&self.converter)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(&root)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::ConverterNotFound {
                        converter: self.converter.clone(),
                    }
                } else {
                    ExtractError::ConverterFailed {
                        status: "failed to start".to_string(),
                        stderr: e.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExtractError::ConverterFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let pages = collect_pages(out_dir)?;
        if pages.is_empty() {
            return Err(ExtractError::NoPagesProduced {
                dir: out_dir.to_path_buf(),
            });
        }

        info!(pages = pages.len(), dpi, "rasterised PDF");
        Ok(pages)
    }
}

/// Collect `page-*.png` outputs in lexical (= page) order.
fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ExtractError::InputRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pages: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.starts_with("page-") && name.ends_with(".png")
        })
        .collect();

    pages.sort();
    Ok(pages)
}

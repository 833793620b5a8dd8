//! Pipeline orchestrator: one uploaded document in, one extracted record out.
//!
//! ## The two paths
//!
//! Every run first probes the PDF's embedded text layer. When the trimmed
//! layer reaches `min_embedded_chars`, that transcript is the answer and no
//! image work happens at all — digitally-generated statements take this
//! path. Otherwise (scans, raster uploads), the OCR sub-pipeline runs:
//! rasterize, normalize the page, recognize the body, crop and read the
//! MICR band, parse its digits. Both paths end in the same field synthesis.
//!
//! Per-step failures below this level degrade instead of failing: they are
//! recorded on the [`RunContext`] and the run carries on with whatever the
//! previous step produced. Only a missing/empty/unreadable upload and a
//! failed rasterization are fatal.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, StepError};
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::raster::{PdftoppmRasterizer, Rasterizer};
use crate::pipeline::recognize::{self, RecognitionMode, TesseractRecognizer, TextRecognizer};
use crate::pipeline::{fields, micr, normalize, region};
use crate::record::{
    text_shape, ExtractedRecord, ExtractionOutput, ExtractionStats, MicrNumbers, TextSource,
};
use crate::run::{PipelinePhase, RunContext};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Run the pipeline with the default engines (`pdftoppm` + `tesseract`,
/// or whatever paths the config points at).
pub async fn extract(
    path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let rasterizer = PdftoppmRasterizer::new(&config.converter_path);
    let recognizer = TesseractRecognizer::new(&config.engine_path, &config.ocr_language);
    extract_with(path, config, &rasterizer, &recognizer).await
}

/// Run the pipeline with explicit engines. This is the seam the tests use:
/// both externals are capabilities, so a fake converter or recognizer slots
/// in without touching the orchestration.
pub async fn extract_with(
    path: &Path,
    config: &ExtractionConfig,
    rasterizer: &dyn Rasterizer,
    recognizer: &dyn TextRecognizer,
) -> Result<ExtractionOutput, ExtractError> {
    let started = Instant::now();
    let mut ctx = RunContext::new(config)?;
    info!(run_id = %ctx.run_id(), input = %path.display(), "extraction run started");

    let kind = match input::classify(path) {
        Ok(kind) => kind,
        Err(e) => return fail(&mut ctx, e),
    };

    ctx.advance(PipelinePhase::DirectTextAttempted);
    let embedded = match kind {
        DocumentKind::Pdf => match read_embedded_text(path).await {
            Ok(text) => text,
            Err(e) => {
                ctx.degrade("embedded-text", e);
                String::new()
            }
        },
        // Raster uploads have no text layer to probe.
        DocumentKind::Image => String::new(),
    };
    let embedded = embedded.trim().to_string();
    let embedded_chars = embedded.chars().count();

    let (raw_text, micr_numbers, text_source, ocr_pages, raster_ms, recognition_ms) =
        if embedded_chars >= config.min_embedded_chars {
            ctx.advance(PipelinePhase::Sufficient);
            info!(
                run_id = %ctx.run_id(),
                chars = embedded_chars,
                "embedded text sufficient; recognition skipped"
            );
            (embedded, MicrNumbers::default(), TextSource::Embedded, 0, 0, 0)
        } else {
            ctx.advance(PipelinePhase::OcrRequired);
            ctx.advance(PipelinePhase::OcrRunning);
            match run_ocr(path, kind, config, rasterizer, recognizer, &mut ctx).await {
                Ok(ocr) => (
                    ocr.text,
                    ocr.micr,
                    TextSource::Ocr,
                    ocr.pages,
                    ocr.raster_ms,
                    ocr.recognition_ms,
                ),
                Err(e) => return fail(&mut ctx, e),
            }
        };

    ctx.advance(PipelinePhase::FieldsSynthesized);
    let mut synth = fields::synthesize(&raw_text);
    fields::merge_micr(&mut synth, &micr_numbers);
    fields::finalize(&mut synth);

    let (text_lines, text_words, text_chars) = text_shape(&raw_text);
    let record = ExtractedRecord {
        account_name: synth.account_name,
        account_number: synth.account_number,
        routing_number: synth.routing_number,
        check_number: synth.check_number,
        ifsc: synth.ifsc,
        bank_name: synth.bank_name,
        branch: synth.branch,
        raw_text,
        raw_micr: micr_numbers.raw.clone(),
        created_at: String::new(),
    };

    let stats = ExtractionStats {
        run_id: ctx.run_id().to_string(),
        text_source,
        embedded_chars,
        ocr_pages,
        text_lines,
        text_words,
        text_chars,
        total_duration_ms: started.elapsed().as_millis() as u64,
        raster_duration_ms: raster_ms,
        recognition_duration_ms: recognition_ms,
    };

    let source_label = match text_source {
        TextSource::Embedded => "embedded",
        TextSource::Ocr => "ocr",
    };
    info!(
        run_id = %ctx.run_id(),
        source = source_label,
        chars = text_chars,
        degraded_steps = ctx.degradations().len(),
        elapsed_ms = stats.total_duration_ms,
        "extraction run complete"
    );

    Ok(ExtractionOutput {
        record,
        stats,
        degradations: ctx.take_degradations(),
    })
}

struct OcrOutcome {
    text: String,
    micr: MicrNumbers,
    pages: usize,
    raster_ms: u64,
    recognition_ms: u64,
}

async fn run_ocr(
    path: &Path,
    kind: DocumentKind,
    config: &ExtractionConfig,
    rasterizer: &dyn Rasterizer,
    recognizer: &dyn TextRecognizer,
    ctx: &mut RunContext,
) -> Result<OcrOutcome, ExtractError> {
    let (pages, raster_ms) = match kind {
        DocumentKind::Pdf => {
            let raster_started = Instant::now();
            let pages = rasterizer
                .rasterize(path, ctx.scratch_dir(), config.dpi)
                .await?;
            (pages, raster_started.elapsed().as_millis() as u64)
        }
        DocumentKind::Image => (vec![stage_upload(path, ctx.scratch_dir()).await?], 0),
    };
    info!(run_id = %ctx.run_id(), pages = pages.len(), "recognition input ready");

    let recognition_started = Instant::now();
    let processed = pages.len().min(config.ocr_page_limit.max(1));
    let mut page_texts: Vec<String> = Vec::new();
    let mut band_text = String::new();

    for (index, page) in pages.iter().take(processed).enumerate() {
        // Geometry first; a failed step falls back to its input.
        let oriented = match normalize::orient(page).await {
            Ok(p) => p,
            Err(e) => {
                ctx.degrade("orient", e);
                page.clone()
            }
        };
        let sized = match normalize::downscale(&oriented, config.target_width).await {
            Ok(p) => p,
            Err(e) => {
                ctx.degrade("downscale", e);
                oriented.clone()
            }
        };

        match normalize::preprocess(&sized, config.body_contrast).await {
            Ok(prepped) => match recognizer.recognize(&prepped, RecognitionMode::Page).await {
                Ok(text) => page_texts.push(text),
                Err(e) => ctx.degrade(RecognitionMode::Page.label(), e),
            },
            Err(e) => ctx.degrade("preprocess", e),
        }

        // The MICR line lives on the first page; later statement pages
        // have none.
        if index == 0 {
            match region::crop_micr_band(&sized, config).await {
                Ok(band) => {
                    let (text, degradations) = recognize::read_micr_band(recognizer, &band).await;
                    band_text = text;
                    for d in degradations {
                        ctx.degrade(&d.stage, d.error);
                    }
                }
                Err(e) => ctx.degrade("micr-band", e),
            }
        }
    }
    let recognition_ms = recognition_started.elapsed().as_millis() as u64;

    Ok(OcrOutcome {
        text: page_texts.join("\n\n").trim().to_string(),
        micr: micr::parse(&band_text),
        pages: processed,
        raster_ms,
        recognition_ms,
    })
}

/// Pull the embedded text layer out of a PDF.
///
/// `pdf_extract` walks the whole document synchronously, so it runs on the
/// blocking pool.
async fn read_embedded_text(path: &Path) -> Result<String, StepError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|e| StepError::EmbeddedText {
            detail: e.to_string(),
        })
    })
    .await
    .unwrap_or_else(|e| {
        Err(StepError::EmbeddedText {
            detail: format!("blocking task failed: {e}"),
        })
    })
}

/// Copy a raster upload into the run's scratch space, keeping its
/// extension as a decoder hint. Derived artifacts then stay inside the
/// run's own directory instead of littering the upload area.
async fn stage_upload(path: &Path, scratch: &Path) -> Result<PathBuf, ExtractError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("png");
    let staged = scratch.join(format!("page-1.{ext}"));
    tokio::fs::copy(path, &staged)
        .await
        .map_err(|e| ExtractError::InputRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(staged)
}

fn fail<T>(ctx: &mut RunContext, err: ExtractError) -> Result<T, ExtractError> {
    ctx.advance(PipelinePhase::Failed);
    error!(run_id = %ctx.run_id(), error = %err, "extraction run failed");
    Err(err)
}

//! Pipeline stages for bank-document extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different rasteriser or OCR engine) without
//! touching other stages.
//!
//! ## Data Flow (OCR path)
//!
//! ```text
//! input ──▶ raster ──▶ normalize ──┬──▶ recognize (page) ──┐
//! (sniff)  (pdftoppm)  (rot/scale/ │                       ├─▶ fields
//!                       contrast)  └─▶ region ──▶ recognize┘   (patterns
//!                                      (MICR)    ──▶ micr       + merge)
//!                                                 (digits)
//! ```
//!
//! 1. [`input`]     — classify the upload by magic bytes (PDF vs raster image)
//! 2. [`raster`]    — rasterise PDF pages via the external converter; skipped
//!    for image uploads, which are already a single page
//! 3. [`normalize`] — orientation fix, capped downscale, greyscale + level
//!    stretch + contrast; CPU-bound work runs in `spawn_blocking`
//! 4. [`region`]    — crop the bottom MICR band with a stronger boost
//! 5. [`recognize`] — OCR passes (digit-whitelisted dual pass for the band,
//!    one unconstrained pass for the page)
//! 6. [`micr`]      — parse routing/account/check numbers from the digit stream
//! 7. [`fields`]    — ordered pattern tables over the transcript, MICR merge,
//!    uppercase finalize

pub mod fields;
pub mod input;
pub mod micr;
pub mod normalize;
pub mod raster;
pub mod recognize;
pub mod region;

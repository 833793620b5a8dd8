//! Input classification: decide what kind of document an upload is.
//!
//! ## Why magic bytes, not file extensions?
//!
//! Uploads arrive with whatever name the client chose — `scan.pdf` is very
//! often a JPEG and `check.png` occasionally a PDF. The first bytes of the
//! file are the only thing the uploader cannot get wrong, so classification
//! reads those and ignores the name entirely. Misclassification here would
//! send an image into the PDF rasteriser (guaranteed converter failure) or a
//! PDF into the image loader (guaranteed empty page), so this check sits
//! before the pipeline proper.

use crate::error::ExtractError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// What the upload turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A PDF — may or may not carry an embedded text layer.
    Pdf,
    /// A raster image; treated as a single already-rasterised page.
    Image,
}

/// Classify a document by its magic bytes.
///
/// Rejects missing, unreadable, and zero-byte files — those are fatal before
/// any pipeline work starts. Accepts PDF, PNG, JPEG, TIFF, and BMP.
pub fn classify(path: &Path) -> Result<DocumentKind, ExtractError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ExtractError::InputRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        // Shorter than 4 bytes: nothing real is this small.
        return Err(ExtractError::EmptyUpload {
            path: path.to_path_buf(),
        });
    }

    let kind = match &magic {
        b"%PDF" => DocumentKind::Pdf,
        [0x89, b'P', b'N', b'G'] => DocumentKind::Image,
        [0xFF, 0xD8, 0xFF, _] => DocumentKind::Image,
        // TIFF, both byte orders.
        [0x49, 0x49, 0x2A, 0x00] | [0x4D, 0x4D, 0x00, 0x2A] => DocumentKind::Image,
        [b'B', b'M', _, _] => DocumentKind::Image,
        _ => {
            return Err(ExtractError::UnsupportedFormat {
                path: path.to_path_buf(),
                magic,
            });
        }
    };

    debug!(path = %path.display(), kind = ?kind, "classified upload");
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn classifies_pdf() {
        let f = file_with(b"%PDF-1.7\nrest of file");
        assert_eq!(classify(f.path()).unwrap(), DocumentKind::Pdf);
    }

    #[test]
    fn classifies_png_and_jpeg() {
        let png = file_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        assert_eq!(classify(png.path()).unwrap(), DocumentKind::Image);

        let jpg = file_with(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        assert_eq!(classify(jpg.path()).unwrap(), DocumentKind::Image);
    }

    #[test]
    fn classifies_tiff_both_endians() {
        let le = file_with(&[0x49, 0x49, 0x2A, 0x00, 0x08]);
        assert_eq!(classify(le.path()).unwrap(), DocumentKind::Image);
        let be = file_with(&[0x4D, 0x4D, 0x00, 0x2A, 0x08]);
        assert_eq!(classify(be.path()).unwrap(), DocumentKind::Image);
    }

    #[test]
    fn zero_byte_upload_is_fatal() {
        let f = file_with(b"");
        match classify(f.path()) {
            Err(ExtractError::EmptyUpload { .. }) => {}
            other => panic!("expected EmptyUpload, got {other:?}"),
        }
    }

    #[test]
    fn unknown_magic_is_unsupported() {
        let f = file_with(b"MZ\x00\x01 executable");
        match classify(f.path()) {
            Err(ExtractError::UnsupportedFormat { magic, .. }) => {
                assert_eq!(&magic[..2], b"MZ");
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        match classify(Path::new("/definitely/not/here.pdf")) {
            Err(ExtractError::FileNotFound { .. }) => {}
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }
}

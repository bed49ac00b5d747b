//! Plain-text extraction from document files.
//!
//! `.pdf` files go through `pdf-extract`; anything else matched by the
//! include globs is read as UTF-8 text. Extraction never panics: failures
//! come back as [`ExtractError`] and ingestion skips the file.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed for {path}: {message}")]
    Pdf { path: String, message: String },
}

/// Extract the text of the file at `path`.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let display = path.display().to_string();
    if is_pdf(path) {
        let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
            path: display.clone(),
            source,
        })?;
        extract_pdf(&bytes).map_err(|message| ExtractError::Pdf {
            path: display,
            message,
        })
    } else {
        std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: display,
            source,
        })
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

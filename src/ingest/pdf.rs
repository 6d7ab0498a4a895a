//! PDF text extraction via lopdf.
//!
//! Open-access PDFs arrive as fetched bytes, not files, so extraction loads
//! from memory. A page that fails to decode is skipped with a warning; the
//! whole document fails only when nothing at all could be extracted.

use tracing::{debug, warn};

use crate::error::AppError;

/// Extract plain text from PDF bytes.
pub fn extract_text(bytes: &[u8]) -> Result<String, AppError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::Ingest(format!("pdf: failed to load document: {e}")))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "extracting text from pdf");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "failed to extract page text, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(AppError::Ingest("pdf: no text content extracted".into()));
    }

    Ok(clean_text(&text))
}

/// Collapse whitespace runs and strip BOM artifacts.
fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("Hello   World\n\nTest"), "Hello World Test");
    }

    #[test]
    fn clean_text_strips_bom() {
        assert_eq!(clean_text("\u{FEFF}data"), "data");
    }

    #[test]
    fn garbage_bytes_error() {
        assert!(extract_text(b"not a pdf at all").is_err());
    }
}

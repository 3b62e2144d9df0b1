//! OCR-need probe: is the embedded text layer good enough?
//!
//! Scanned documents usually still parse: the parser finds the page images
//! and either no text at all or a thin, often invisible, OCR layer. A page is
//! considered a scan when
//!
//! * no text block carries any non-whitespace text, or
//! * it holds at least one image and fewer than `min_chars_per_page`
//!   non-whitespace characters.
//!
//! One scanned page is enough to send the whole document to the cloud
//! analyser, and a parser failure counts as "needs OCR" as well.

use crate::backend::direct::ParsedPage;
use crate::error::BackendError;
use tracing::{debug, info, warn};

/// Document-level probe decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeOutcome {
    pub needs_ocr: bool,
    /// 1-based page numbers that tripped the rule.
    pub pages_needing_ocr: Vec<u32>,
    /// The parser could not read the document.
    pub probe_failed: bool,
    pub page_count: usize,
}

/// Per-page rule.
pub fn page_needs_ocr(page: &ParsedPage, min_chars_per_page: usize) -> bool {
    if !page.has_text() {
        return true;
    }
    page.image_count > 0 && page.text_char_count() < min_chars_per_page
}

/// Aggregate the per-page rule over a parse result.
pub fn probe_pages(parsed: Result<&[ParsedPage], &BackendError>, min_chars_per_page: usize) -> ProbeOutcome {
    let pages = match parsed {
        Ok(pages) => pages,
        Err(e) => {
            warn!("OCR probe could not parse the document, requiring cloud analysis: {}", e);
            return ProbeOutcome {
                needs_ocr: true,
                pages_needing_ocr: Vec::new(),
                probe_failed: true,
                page_count: 0,
            };
        }
    };

    let pages_needing_ocr: Vec<u32> = pages
        .iter()
        .filter(|p| {
            let scanned = page_needs_ocr(p, min_chars_per_page);
            if scanned {
                debug!(
                    "Page {} looks scanned ({} chars, {} images)",
                    p.page_number,
                    p.text_char_count(),
                    p.image_count
                );
            }
            scanned
        })
        .map(|p| p.page_number)
        .collect();

    let outcome = ProbeOutcome {
        needs_ocr: !pages_needing_ocr.is_empty(),
        pages_needing_ocr,
        probe_failed: false,
        page_count: pages.len(),
    };
    info!(
        "OCR probe: {} of {} page(s) need OCR",
        outcome.pages_needing_ocr.len(),
        outcome.page_count
    );
    outcome
}

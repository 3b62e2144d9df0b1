//! Direct extraction: the PDF's own text layer, read by a local parser.
//!
//! Parsers like pdfium are synchronous C libraries doing CPU-bound work, so
//! they always run under `tokio::task::spawn_blocking`.
//!
//! The same parse feeds two consumers: the OCR-need probe inspects the
//! [`ParsedPage`]s, and when the probe decides the text layer is good enough
//! the very same pages become the [`RawDocument`] without a second parse.

use crate::backend::pdfium::PdfiumParser;
use crate::backend::RawPageSource;
use crate::error::BackendError;
use crate::raw::{BackendKind, RawBlock, RawDocument, RawLayout, RawPage, RawSpan};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One page as produced by a [`PdfParser`], in PDF points, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// 1-based.
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub blocks: Vec<RawBlock>,
    /// Image objects found on the page. Only the probe looks at this.
    pub image_count: usize,
}

impl ParsedPage {
    /// Non-whitespace characters across every text block.
    pub fn text_char_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.is_text())
            .flat_map(|b| b.spans())
            .map(|s| s.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }

    /// Whether any text block carries non-whitespace text.
    pub fn has_text(&self) -> bool {
        self.blocks
            .iter()
            .filter(|b| b.is_text())
            .flat_map(|b| b.spans())
            .any(|s| s.text.chars().any(|c| !c.is_whitespace()))
    }
}

/// Synchronous local PDF parser.
///
/// Called on tokio's blocking pool, so implementations must be
/// `Send + Sync`.
pub trait PdfParser: Send + Sync {
    fn parse(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<ParsedPage>, BackendError>;
}

/// [`RawPageSource`] over a [`PdfParser`].
#[derive(Clone)]
pub struct DirectExtractor {
    parser: Arc<dyn PdfParser>,
    password: Option<String>,
}

impl std::fmt::Debug for DirectExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectExtractor")
            .field("parser", &"<dyn PdfParser>")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DirectExtractor {
    pub fn new(parser: Arc<dyn PdfParser>, password: Option<String>) -> Self {
        Self { parser, password }
    }

    /// Extractor backed by [`PdfiumParser`].
    pub fn pdfium(block_gap_factor: f32, password: Option<String>) -> Self {
        Self::new(Arc::new(PdfiumParser::new(block_gap_factor)), password)
    }

    /// Run the parser on the blocking pool.
    pub async fn parse_pages(&self, bytes: &[u8]) -> Result<Vec<ParsedPage>, BackendError> {
        let parser = Arc::clone(&self.parser);
        let bytes = bytes.to_vec();
        let password = self.password.clone();

        let pages = tokio::task::spawn_blocking(move || parser.parse(&bytes, password.as_deref()))
            .await
            .map_err(|e| BackendError::Task(format!("Parser task panicked: {}", e)))??;

        debug!("Direct parser produced {} page(s)", pages.len());
        Ok(pages)
    }
}

#[async_trait]
impl RawPageSource for DirectExtractor {
    fn kind(&self) -> BackendKind {
        BackendKind::DirectExtraction
    }

    async fn analyze(&self, bytes: &[u8]) -> Result<RawDocument, BackendError> {
        let pages = self.parse_pages(bytes).await?;
        Ok(into_raw_document(pages))
    }
}

/// Wrap parsed pages as a direct-extraction [`RawDocument`].
///
/// Pages without a usable size are skipped since nothing on them could be
/// normalized.
pub fn into_raw_document(pages: Vec<ParsedPage>) -> RawDocument {
    let pages = pages
        .into_iter()
        .filter(|p| {
            let usable = p.width > 0.0 && p.height > 0.0;
            if !usable {
                debug!("Skipping page {} with size {}x{}", p.page_number, p.width, p.height);
            }
            usable
        })
        .map(|p| RawPage {
            page_number: p.page_number,
            width: p.width,
            height: p.height,
            unit: "pt".to_string(),
            layout: RawLayout::Blocks(p.blocks),
            tables: Vec::new(),
        })
        .collect();

    RawDocument {
        source: BackendKind::DirectExtraction,
        pages,
        key_value_pairs: Vec::new(),
    }
}

/// Text of one line from its spans.
///
/// A single span is used as is. Between spans a single space is inserted,
/// unless the incoming span is pure whitespace or the text so far already
/// ends in a space.
pub fn join_spans(spans: &[RawSpan]) -> String {
    if let [only] = spans {
        return only.text.clone();
    }
    let mut text = String::new();
    for (i, span) in spans.iter().enumerate() {
        let blank = span.text.chars().all(char::is_whitespace);
        if i > 0 && !blank && !text.ends_with(' ') {
            text.push(' ');
        }
        text.push_str(&span.text);
    }
    text
}

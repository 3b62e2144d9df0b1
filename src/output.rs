//! Normalized document model returned by [`crate::normalize()`].
//!
//! Every geometry field is a [`BoundingPolygon`] in unit-square coordinates,
//! whichever backend produced the page. The document-level collections
//! (`lines`, `paragraphs`, `sentences`, `tables`) are flattenings of the
//! page-level data in page order.

use crate::geometry::BoundingPolygon;
use crate::normalize::AssemblyState;
use crate::raw::BackendKind;
use serde::{Deserialize, Serialize};

/// Root of the normalized structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
    pub lines: Vec<Line>,
    pub paragraphs: Vec<Paragraph>,
    pub sentences: Vec<Sentence>,
    pub tables: Vec<Table>,
    pub key_value_pairs: Vec<KeyValuePair>,
    pub summary: NormalizationSummary,
}

impl Document {
    pub fn page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    /// Sentences that belong to `page_number`, in reading order.
    pub fn sentences_on(&self, page_number: u32) -> impl Iterator<Item = &Sentence> {
        self.sentences.iter().filter(move |s| s.page_number == page_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based.
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    pub lines: Vec<Line>,
    pub words: Vec<Word>,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub content: String,
    pub bounding_box: BoundingPolygon,
    /// Only the cloud analyser reports word confidence.
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub content: String,
    pub bounding_box: BoundingPolygon,
    pub page_number: u32,
    /// Position of the line within its page.
    pub line_index: usize,
    pub confidence: Option<f64>,
}

/// Styled run of text inside a line (direct extraction only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub bounding_box: BoundingPolygon,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub flags: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub content: String,
    pub bounding_box: BoundingPolygon,
    /// `[start, end)` byte offsets into the segmenter's concatenated line text.
    pub char_span: (usize, usize),
    /// `line_index` of every line of the page the sentence overlaps, ascending.
    pub overlapping_lines: Vec<usize>,
    pub page_number: u32,
    /// Position among the sentences of the same paragraph.
    pub sentence_index: usize,
    pub paragraph_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub content: String,
    pub bounding_box: BoundingPolygon,
    pub words: Vec<Word>,
    pub sentences: Vec<Sentence>,
    pub spans: Vec<Span>,
    pub page_number: u32,
    /// Position among the document's paragraphs.
    pub paragraph_index: usize,
    pub metadata: ParagraphMetadata,
}

/// Whatever descriptive data the producing backend attached to a paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParagraphMetadata {
    Extracted {
        font: Option<String>,
        size: Option<f32>,
        color: Option<u32>,
        span_type: SpanType,
    },
    Analyzed {
        role: Option<String>,
        confidence: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    SingleSpan,
    MultiSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub row_count: u32,
    pub column_count: u32,
    pub page_number: u32,
    /// Position of the table within its page.
    pub table_index: usize,
    pub bounding_box: Option<BoundingPolygon>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub content: String,
    pub kind: Option<String>,
    pub row_index: u32,
    pub column_index: u32,
    pub row_span: u32,
    pub column_span: u32,
    pub bounding_box: Option<BoundingPolygon>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Option<String>,
    pub page_number: Option<u32>,
    pub key_bounding_box: Option<BoundingPolygon>,
    pub value_bounding_box: Option<BoundingPolygon>,
    pub confidence: Option<f64>,
}

/// How the document was produced.
///
/// `probe_needs_ocr` records what the probe concluded; `ocr_applied` records
/// whether the cloud analysis actually supplied the structure. They differ
/// when the cloud call failed and the direct path took over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub route: BackendKind,
    pub probe_needs_ocr: bool,
    pub probe_failed: bool,
    pub pages_needing_ocr: Vec<u32>,
    pub ocr_applied: bool,
    pub fallback_reason: Option<String>,
    /// Number of fragment merges performed on the direct path.
    pub merged_blocks: usize,
    pub state_trace: Vec<AssemblyState>,
    pub duration_ms: u64,
}

impl Default for NormalizationSummary {
    fn default() -> Self {
        Self {
            route: BackendKind::DirectExtraction,
            probe_needs_ocr: false,
            probe_failed: false,
            pages_needing_ocr: Vec::new(),
            ocr_applied: false,
            fallback_reason: None,
            merged_blocks: 0,
            state_trace: Vec::new(),
            duration_ms: 0,
        }
    }
}

//! Backend-native page structures, before normalization.
//!
//! Both adapters produce a [`RawDocument`]. Geometry stays in the page space
//! of whichever backend produced it; the page carries its own width, height
//! and unit so the assembler can normalize later.
//!
//! The two backends disagree on granularity, so a page's text layout is a
//! tagged variant:
//!
//! * [`RawLayout::Blocks`]: the local parser's block → line → span → char
//!   tree. Paragraphs are implied by blocks.
//! * [`RawLayout::Regions`]: the cloud analyser's independent line, word and
//!   paragraph collections. Which line belongs to which paragraph has to be
//!   recovered afterwards.

use crate::geometry::RawPolygon;
use serde::{Deserialize, Serialize};

/// Which backend produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Cloud document-intelligence analysis (OCR-grade).
    CloudAnalysis,
    /// Embedded PDF text read by the local parser.
    DirectExtraction,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::CloudAnalysis => f.write_str("cloud-analysis"),
            BackendKind::DirectExtraction => f.write_str("direct-extraction"),
        }
    }
}

/// Whole-document output of a [`crate::backend::RawPageSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub source: BackendKind,
    pub pages: Vec<RawPage>,
    /// Document-level key/value pairs (cloud only).
    pub key_value_pairs: Vec<RawKeyValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// 1-based page number.
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    pub layout: RawLayout,
    pub tables: Vec<RawTable>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawLayout {
    Blocks(Vec<RawBlock>),
    Regions {
        lines: Vec<RawRegion>,
        words: Vec<RawRegion>,
        paragraphs: Vec<RawParagraph>,
    },
}

// ── Direct-extraction tree ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub number: usize,
    pub kind: BlockKind,
    pub bbox: RawPolygon,
    pub lines: Vec<RawBlockLine>,
}

impl RawBlock {
    pub fn is_text(&self) -> bool {
        self.kind == BlockKind::Text
    }

    /// Whitespace-separated word count over every span of the block.
    pub fn word_count(&self) -> usize {
        self.spans().map(|s| s.text.split_whitespace().count()).sum()
    }

    pub fn spans(&self) -> impl Iterator<Item = &RawSpan> {
        self.lines.iter().flat_map(|l| l.spans.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBlockLine {
    pub bbox: RawPolygon,
    pub spans: Vec<RawSpan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSpan {
    pub text: String,
    pub bbox: RawPolygon,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub flags: Option<u32>,
    pub color: Option<u32>,
    pub chars: Vec<RawChar>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawChar {
    pub c: char,
    pub bbox: RawPolygon,
}

// ── Cloud-analysis regions ───────────────────────────────────────────────

/// A line or word reported by the cloud analyser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    pub content: String,
    pub polygon: RawPolygon,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawParagraph {
    pub content: String,
    pub polygon: RawPolygon,
    pub role: Option<String>,
    pub confidence: Option<f64>,
}

// ── Shared ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub row_count: u32,
    pub column_count: u32,
    pub polygon: Option<RawPolygon>,
    pub cells: Vec<RawCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    pub content: String,
    pub kind: Option<String>,
    pub row_index: u32,
    pub column_index: u32,
    pub row_span: u32,
    pub column_span: u32,
    pub polygon: Option<RawPolygon>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawKeyValuePair {
    pub key: String,
    pub value: Option<String>,
    /// Page hosting the key, with the key polygon in that page's space.
    pub key_region: Option<(u32, RawPolygon)>,
    pub value_region: Option<(u32, RawPolygon)>,
    pub confidence: Option<f64>,
}

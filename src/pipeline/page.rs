//! Per-page preprocessing: one [`RawPage`] in, one [`PageOutcome`] out.
//!
//! Pages share no state, so the assembler can run this on the blocking pool
//! and commit the outcomes in page order. The two raw layouts take different
//! routes:
//!
//! ```text
//! Blocks  ──▶ merge fragments ──▶ block = paragraph ──▶ segment block lines
//! Regions ──▶ associate lines with each paragraph   ──▶ segment matched lines
//! ```

use crate::backend::direct::join_spans;
use crate::config::Thresholds;
use crate::geometry::{envelope, normalize, overlap_ratio, BoundingPolygon, RawPolygon};
use crate::output::{Line, Page, Paragraph, ParagraphMetadata, Sentence, Span, SpanType, Word};
use crate::pipeline::associate::lines_for_paragraph;
use crate::pipeline::merge::merge_fragments;
use crate::pipeline::segment::SentenceSegmenter;
use crate::pipeline::tables::normalize_table;
use crate::raw::{RawBlock, RawChar, RawLayout, RawPage, RawParagraph, RawRegion, RawSpan};
use tracing::debug;

/// Everything one page contributes to the document.
///
/// `paragraph_index` values are page-local here; the accumulator shifts them
/// to document positions on commit.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page: Page,
    pub paragraphs: Vec<Paragraph>,
    /// Every sentence of the page in reading order.
    pub sentences: Vec<Sentence>,
    pub merged_blocks: usize,
}

/// Build the normalized structure of one page.
pub fn build_page(raw: RawPage, thresholds: &Thresholds, segmenter: &SentenceSegmenter) -> PageOutcome {
    let RawPage {
        page_number,
        width,
        height,
        unit,
        layout,
        tables,
    } = raw;

    let tables = tables
        .iter()
        .enumerate()
        .map(|(i, t)| normalize_table(t, page_number, i, width, height))
        .collect();

    let dims = PageDims {
        page_number,
        width,
        height,
    };
    let text = match layout {
        RawLayout::Blocks(blocks) => direct_text(blocks, dims, thresholds, segmenter),
        RawLayout::Regions {
            lines,
            words,
            paragraphs,
        } => cloud_text(&lines, &words, &paragraphs, dims, thresholds, segmenter),
    };

    debug!(
        "Page {}: {} line(s), {} paragraph(s), {} sentence(s)",
        page_number,
        text.lines.len(),
        text.paragraphs.len(),
        text.sentences.len()
    );

    PageOutcome {
        page: Page {
            page_number,
            width,
            height,
            unit,
            lines: text.lines,
            words: text.words,
            tables,
        },
        paragraphs: text.paragraphs,
        sentences: text.sentences,
        merged_blocks: text.merged_blocks,
    }
}

#[derive(Debug, Clone, Copy)]
struct PageDims {
    page_number: u32,
    width: f64,
    height: f64,
}

impl PageDims {
    fn normalize(&self, polygon: &RawPolygon) -> BoundingPolygon {
        normalize(polygon, self.width, self.height)
    }
}

#[derive(Default)]
struct PageText {
    lines: Vec<Line>,
    words: Vec<Word>,
    paragraphs: Vec<Paragraph>,
    sentences: Vec<Sentence>,
    merged_blocks: usize,
}

// ── Direct extraction ────────────────────────────────────────────────────

fn direct_text(
    blocks: Vec<RawBlock>,
    dims: PageDims,
    thresholds: &Thresholds,
    segmenter: &SentenceSegmenter,
) -> PageText {
    let (blocks, merged_blocks) = merge_fragments(blocks, thresholds.fragment_word_threshold);
    let mut out = PageText {
        merged_blocks,
        ..PageText::default()
    };

    for block in blocks.iter().filter(|b| b.is_text()) {
        let block_lines: Vec<Line> = block
            .lines
            .iter()
            .filter_map(|line| {
                let content = join_spans(&line.spans).trim().to_string();
                (!content.is_empty()).then(|| Line {
                    content,
                    bounding_box: dims.normalize(&line.bbox),
                    page_number: dims.page_number,
                    line_index: 0,
                    confidence: None,
                })
            })
            .enumerate()
            .map(|(i, mut line)| {
                line.line_index = out.lines.len() + i;
                line
            })
            .collect();
        if block_lines.is_empty() {
            continue;
        }

        let paragraph_index = out.paragraphs.len();
        let words: Vec<Word> = block.spans().flat_map(|s| span_words(s, dims)).collect();
        let spans = block
            .spans()
            .map(|s| Span {
                text: s.text.clone(),
                bounding_box: dims.normalize(&s.bbox),
                font: s.font.clone(),
                size: s.size,
                flags: s.flags,
            })
            .collect();
        let sentences = segmenter.segment(&block_lines, dims.page_number, Some(paragraph_index));
        let content = block_lines
            .iter()
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        out.paragraphs.push(Paragraph {
            content,
            bounding_box: dims.normalize(&block.bbox),
            words: words.clone(),
            sentences: sentences.clone(),
            spans,
            page_number: dims.page_number,
            paragraph_index,
            metadata: extracted_metadata(block),
        });
        out.words.extend(words);
        out.sentences.extend(sentences);
        out.lines.extend(block_lines);
    }
    out
}

/// Style of the block's first span.
fn extracted_metadata(block: &RawBlock) -> ParagraphMetadata {
    let first = block.spans().next();
    let span_type = if block.lines.iter().any(|l| l.spans.len() > 1) {
        SpanType::MultiSpan
    } else {
        SpanType::SingleSpan
    };
    ParagraphMetadata::Extracted {
        font: first.and_then(|s| s.font.clone()),
        size: first.and_then(|s| s.size),
        color: first.and_then(|s| s.color),
        span_type,
    }
}

/// Words of a span: runs of non-whitespace characters boxed by their chars,
/// or whitespace tokens boxed by the span when the parser gave no chars.
fn span_words(span: &RawSpan, dims: PageDims) -> Vec<Word> {
    if span.chars.is_empty() {
        return span
            .text
            .split_whitespace()
            .map(|w| Word {
                content: w.to_string(),
                bounding_box: dims.normalize(&span.bbox),
                confidence: None,
            })
            .collect();
    }

    let mut words = Vec::new();
    let mut run: Vec<&RawChar> = Vec::new();
    for ch in &span.chars {
        if ch.c.is_whitespace() {
            flush_word(&mut run, dims, &mut words);
        } else {
            run.push(ch);
        }
    }
    flush_word(&mut run, dims, &mut words);
    words
}

fn flush_word(run: &mut Vec<&RawChar>, dims: PageDims, words: &mut Vec<Word>) {
    if let Some(bbox) = envelope(run.iter().map(|c| &c.bbox)) {
        words.push(Word {
            content: run.iter().map(|c| c.c).collect(),
            bounding_box: dims.normalize(&bbox),
            confidence: None,
        });
    }
    run.clear();
}

// ── Cloud analysis ───────────────────────────────────────────────────────

fn cloud_text(
    lines: &[RawRegion],
    words: &[RawRegion],
    paragraphs: &[RawParagraph],
    dims: PageDims,
    thresholds: &Thresholds,
    segmenter: &SentenceSegmenter,
) -> PageText {
    let page_lines: Vec<Line> = lines
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .enumerate()
        .map(|(line_index, r)| Line {
            content: r.content.clone(),
            bounding_box: dims.normalize(&r.polygon),
            page_number: dims.page_number,
            line_index,
            confidence: r.confidence,
        })
        .collect();
    let page_words: Vec<Word> = words
        .iter()
        .map(|r| Word {
            content: r.content.clone(),
            bounding_box: dims.normalize(&r.polygon),
            confidence: r.confidence,
        })
        .collect();

    let mut out = PageText::default();
    for (paragraph_index, paragraph) in paragraphs.iter().enumerate() {
        let bounding_box = dims.normalize(&paragraph.polygon);
        let matched = lines_for_paragraph(
            &paragraph.content,
            &bounding_box,
            &page_lines,
            thresholds.word_overlap_threshold,
            thresholds.spatial_overlap_threshold,
        );
        let sentences = segmenter.segment(&matched, dims.page_number, Some(paragraph_index));
        let words = page_words
            .iter()
            .filter(|w| overlap_ratio(&w.bounding_box, &bounding_box) > thresholds.spatial_overlap_threshold)
            .cloned()
            .collect();

        out.sentences.extend(sentences.iter().cloned());
        out.paragraphs.push(Paragraph {
            content: paragraph.content.clone(),
            bounding_box,
            words,
            sentences,
            spans: Vec::new(),
            page_number: dims.page_number,
            paragraph_index,
            metadata: ParagraphMetadata::Analyzed {
                role: paragraph.role.clone(),
                confidence: paragraph.confidence,
            },
        });
    }

    if paragraphs.is_empty() && !page_lines.is_empty() {
        debug!(
            "Page {} has no analysed paragraphs; segmenting all {} line(s)",
            dims.page_number,
            page_lines.len()
        );
        out.sentences = segmenter.segment(&page_lines, dims.page_number, None);
    }

    out.lines = page_lines;
    out.words = page_words;
    out
}

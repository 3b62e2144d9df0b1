//! [`PdfParser`] backed by pdfium.
//!
//! pdfium reports text as *segments* (runs sharing one font and baseline)
//! with per-character boxes, but has no notion of lines or blocks. This
//! module turns segments into [`RawSpan`]s and then rebuilds the
//! block → line → span tree geometrically:
//!
//! * a span joins the current line when it shares the line's vertical band;
//! * a line starts a new block when the gap above it exceeds
//!   `block_gap_factor` line heights, or when reading order jumps back up
//!   the page (next column);
//! * image objects become image blocks, placed before the first text block
//!   that starts below them, so fragment merging never crosses a figure.
//!
//! A page whose text layer pdfium cannot read is kept with no text blocks;
//! the probe then sees it as needing OCR.
//!
//! PDF space has its origin at the bottom-left with `y` growing upwards;
//! everything produced here is flipped to top-left, `y` down.

use crate::backend::direct::{ParsedPage, PdfParser};
use crate::error::BackendError;
use crate::geometry::{envelope, RawPolygon};
use crate::raw::{BlockKind, RawBlock, RawBlockLine, RawChar, RawSpan};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Span flag bits, same layout as the common PDF-tooling convention.
pub const FLAG_ITALIC: u32 = 1 << 1;
pub const FLAG_BOLD: u32 = 1 << 4;

/// Bind pdfium for one parse.
///
/// Tries `PDFIUM_LIB_PATH` (the library file, or a directory holding it),
/// then a library in the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, BackendError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(|p| Pdfium::bind_to_library(library_path(Path::new(&p))));

    let bindings = match from_env {
        Some(Ok(bindings)) => Ok(bindings),
        Some(Err(e)) => {
            warn!("PDFIUM_LIB_PATH could not be bound ({}); trying defaults", e);
            bind_default()
        }
        None => bind_default(),
    }
    .map_err(|e| BackendError::Binding(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

fn bind_default() -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
}

/// A directory resolves to the platform library name inside it.
fn library_path(path: &Path) -> std::path::PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

/// Local parser reading the embedded text layer through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumParser {
    block_gap_factor: f32,
}

impl Default for PdfiumParser {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl PdfiumParser {
    pub fn new(block_gap_factor: f32) -> Self {
        Self { block_gap_factor }
    }
}

impl PdfParser for PdfiumParser {
    fn parse(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<ParsedPage>, BackendError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
            let detail = format!("{:?}", e);
            if detail.contains("Password") || detail.contains("password") {
                BackendError::Password {
                    provided: password.is_some(),
                }
            } else {
                BackendError::Parse(detail)
            }
        })?;

        let total = document.pages().len();
        info!("PDF loaded: {} pages", total);

        let mut pages = Vec::with_capacity(usize::from(total));
        for (index, page) in document.pages().iter().enumerate() {
            let page_number = index as u32 + 1;
            pages.push(self.parse_page(page_number, &page));
        }
        Ok(pages)
    }
}

impl PdfiumParser {
    fn parse_page(&self, page_number: u32, page: &PdfPage) -> ParsedPage {
        let width = f64::from(page.width().value);
        let height = f64::from(page.height().value);

        let spans = match read_spans(page, height) {
            Ok(spans) => spans,
            Err(e) => {
                warn!("Page {}: text layer unreadable ({}); keeping the page without text", page_number, e);
                Vec::new()
            }
        };

        let images: Vec<RawPolygon> = page
            .objects()
            .iter()
            .filter(|object| object.object_type() == PdfPageObjectType::Image)
            .filter_map(|object| match object.bounds() {
                Ok(bounds) => Some(flip_edges(
                    f64::from(bounds.left().value),
                    f64::from(bounds.bottom().value),
                    f64::from(bounds.right().value),
                    f64::from(bounds.top().value),
                    height,
                )),
                Err(e) => {
                    debug!("Page {}: image without bounds ({})", page_number, e);
                    None
                }
            })
            .collect();

        assemble_page(page_number, width, height, spans, images, self.block_gap_factor)
    }
}

fn read_spans(page: &PdfPage, page_height: f64) -> Result<Vec<RawSpan>, PdfiumError> {
    let text = page.text()?;
    let mut spans = Vec::new();
    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let bbox = flip(&segment.bounds(), page_height);
        let (chars, style) = segment_chars(&segment, page_height);
        spans.push(RawSpan {
            text: content,
            bbox,
            font: style.font,
            size: style.size,
            flags: Some(style.flags),
            color: None,
            chars,
        });
    }
    Ok(spans)
}

/// Lay out one page from the spans and image boxes read off it.
fn assemble_page(
    page_number: u32,
    width: f64,
    height: f64,
    spans: Vec<RawSpan>,
    images: Vec<RawPolygon>,
    block_gap_factor: f32,
) -> ParsedPage {
    let image_count = images.len();
    let blocks = layout_blocks(spans, images, block_gap_factor);
    debug!(
        "Page {}: {} block(s), {} image(s)",
        page_number,
        blocks.len(),
        image_count
    );
    ParsedPage {
        page_number,
        width,
        height,
        blocks,
        image_count,
    }
}

#[derive(Default)]
struct SpanStyle {
    font: Option<String>,
    size: Option<f32>,
    flags: u32,
}

fn segment_chars(segment: &PdfPageTextSegment<'_>, page_height: f64) -> (Vec<RawChar>, SpanStyle) {
    let Ok(chars) = segment.chars() else {
        return (Vec::new(), SpanStyle::default());
    };

    let mut style = SpanStyle::default();
    let mut out = Vec::new();
    for (i, ch) in chars.iter().enumerate() {
        if i == 0 {
            let name = ch.font_name();
            style.font = (!name.is_empty()).then_some(name);
            style.size = Some(ch.scaled_font_size().value);
            let bold = match ch.font_weight() {
                Some(PdfFontWeight::Weight600)
                | Some(PdfFontWeight::Weight700Bold)
                | Some(PdfFontWeight::Weight800)
                | Some(PdfFontWeight::Weight900) => true,
                Some(PdfFontWeight::Custom(weight)) => weight >= 600,
                _ => false,
            };
            if bold {
                style.flags |= FLAG_BOLD;
            }
            if ch.font_is_italic() {
                style.flags |= FLAG_ITALIC;
            }
        }

        let Some(c) = ch.unicode_char() else {
            continue;
        };
        let Ok(rect) = ch.loose_bounds() else {
            continue;
        };
        out.push(RawChar {
            c,
            bbox: flip(&rect, page_height),
        });
    }
    (out, style)
}

/// Convert a bottom-left-origin PDF rectangle into a top-left polygon.
fn flip(rect: &PdfRect, page_height: f64) -> RawPolygon {
    flip_edges(
        f64::from(rect.left().value),
        f64::from(rect.bottom().value),
        f64::from(rect.right().value),
        f64::from(rect.top().value),
        page_height,
    )
}

fn flip_edges(left: f64, bottom: f64, right: f64, top: f64, page_height: f64) -> RawPolygon {
    let top = page_height - top;
    let bottom = page_height - bottom;
    RawPolygon::from_rect(left, top.min(bottom), right, top.max(bottom))
}

/// Group spans (in reading order) into lines and lines into blocks, then
/// place an image block before the first text block that starts below it.
pub fn layout_blocks(spans: Vec<RawSpan>, mut images: Vec<RawPolygon>, block_gap_factor: f32) -> Vec<RawBlock> {
    let lines = group_lines(spans);

    let mut groups: Vec<Vec<RawBlockLine>> = Vec::new();
    for line in lines {
        let starts_block = match groups.last().and_then(|b| b.last()) {
            None => true,
            Some(prev) => {
                let prev_height = (prev.bbox.max_y() - prev.bbox.min_y()).max(1.0);
                let gap = line.bbox.min_y() - prev.bbox.max_y();
                let jumped_up = line.bbox.max_y() < prev.bbox.min_y();
                gap > f64::from(block_gap_factor) * prev_height || jumped_up
            }
        };
        if starts_block {
            groups.push(vec![line]);
        } else if let Some(current) = groups.last_mut() {
            current.push(line);
        }
    }

    let mut blocks: Vec<RawBlock> = groups
        .into_iter()
        .filter_map(|lines| {
            let bbox = envelope(lines.iter().map(|l| &l.bbox))?;
            Some(RawBlock {
                number: 0,
                kind: BlockKind::Text,
                bbox,
                lines,
            })
        })
        .collect();

    images.sort_by(|a, b| a.min_y().partial_cmp(&b.min_y()).unwrap_or(std::cmp::Ordering::Equal));
    for bbox in images {
        let at = blocks
            .iter()
            .position(|b| b.is_text() && b.bbox.min_y() > bbox.min_y())
            .unwrap_or(blocks.len());
        blocks.insert(
            at,
            RawBlock {
                number: 0,
                kind: BlockKind::Image,
                bbox,
                lines: Vec::new(),
            },
        );
    }

    for (number, block) in blocks.iter_mut().enumerate() {
        block.number = number;
    }
    blocks
}

fn group_lines(spans: Vec<RawSpan>) -> Vec<RawBlockLine> {
    let mut lines: Vec<Vec<RawSpan>> = Vec::new();
    for span in spans {
        let joins = lines
            .last()
            .and_then(|line| envelope(line.iter().map(|s| &s.bbox)))
            .is_some_and(|band| same_band(&band, &span.bbox));
        if joins {
            if let Some(line) = lines.last_mut() {
                line.push(span);
            }
        } else {
            lines.push(vec![span]);
        }
    }

    lines
        .into_iter()
        .filter_map(|mut spans| {
            spans.sort_by(|a, b| a.bbox.min_x().partial_cmp(&b.bbox.min_x()).unwrap_or(std::cmp::Ordering::Equal));
            let bbox = envelope(spans.iter().map(|s| &s.bbox))?;
            Some(RawBlockLine { bbox, spans })
        })
        .collect()
}

/// Vertical overlap above half the smaller height.
fn same_band(line: &RawPolygon, span: &RawPolygon) -> bool {
    let overlap = line.max_y().min(span.max_y()) - line.min_y().max(span.min_y());
    let smaller = (line.max_y() - line.min_y()).min(span.max_y() - span.min_y());
    smaller > 0.0 && overlap > 0.5 * smaller
}

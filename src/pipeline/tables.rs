//! Table and key/value normalization.
//!
//! No structure is inferred here: row/column indices and spans pass through
//! untouched, only geometry moves into the unit square using the owning
//! page's size.

use crate::geometry::{normalize, RawPolygon};
use crate::output::{Cell, KeyValuePair, Table};
use crate::raw::{RawKeyValuePair, RawPage, RawTable};
use std::collections::HashMap;

/// Normalize one table of a page.
pub fn normalize_table(raw: &RawTable, page_number: u32, table_index: usize, width: f64, height: f64) -> Table {
    Table {
        row_count: raw.row_count,
        column_count: raw.column_count,
        page_number,
        table_index,
        bounding_box: raw.polygon.as_ref().map(|p| normalize(p, width, height)),
        cells: raw
            .cells
            .iter()
            .map(|cell| Cell {
                content: cell.content.clone(),
                kind: cell.kind.clone(),
                row_index: cell.row_index,
                column_index: cell.column_index,
                row_span: cell.row_span,
                column_span: cell.column_span,
                bounding_box: cell.polygon.as_ref().map(|p| normalize(p, width, height)),
                confidence: cell.confidence,
            })
            .collect(),
    }
}

/// Normalize document-level key/value pairs against the pages they point at.
///
/// A region on a page that is not in `pages` loses its box but the pair is
/// kept.
pub fn normalize_key_value_pairs(pairs: &[RawKeyValuePair], pages: &[RawPage]) -> Vec<KeyValuePair> {
    let dims: HashMap<u32, (f64, f64)> = pages
        .iter()
        .map(|p| (p.page_number, (p.width, p.height)))
        .collect();

    pairs
        .iter()
        .map(|pair| {
            let place = |region: &Option<(u32, RawPolygon)>| {
                region.as_ref().and_then(|(page, polygon)| {
                    dims.get(page).map(|&(w, h)| normalize(polygon, w, h))
                })
            };
            KeyValuePair {
                key: pair.key.clone(),
                value: pair.value.clone(),
                page_number: pair.key_region.as_ref().map(|(page, _)| *page),
                key_bounding_box: place(&pair.key_region),
                value_bounding_box: place(&pair.value_region),
                confidence: pair.confidence,
            }
        })
        .collect()
}

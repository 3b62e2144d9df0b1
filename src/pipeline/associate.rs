//! Paragraph–line association for cloud-analysed pages.
//!
//! The cloud analyser reports lines and paragraphs as independent
//! collections with no link between them. A line is taken to belong to a
//! paragraph when both hold:
//!
//! 1. **lexical**: more than `word_overlap_threshold` of the line's distinct
//!    lower-cased words also occur in the paragraph;
//! 2. **spatial**: the intersection of the two boxes is more than
//!    `spatial_overlap_threshold` of the smaller box.
//!
//! Matches come back top to bottom by mean `y`.

use crate::geometry::{cmp_mean_y, overlap_ratio, BoundingPolygon};
use crate::output::Line;
use std::collections::HashSet;

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Share of the line's distinct words found in `paragraph_words`.
///
/// An empty line scores zero.
pub fn word_overlap(line: &str, paragraph_words: &HashSet<String>) -> f64 {
    let line_words = word_set(line);
    if line_words.is_empty() {
        return 0.0;
    }
    let shared = line_words.intersection(paragraph_words).count();
    shared as f64 / line_words.len() as f64
}

/// Lines of `lines` that belong to the paragraph, sorted by mean `y`.
pub fn lines_for_paragraph(
    paragraph_content: &str,
    paragraph_box: &BoundingPolygon,
    lines: &[Line],
    word_overlap_threshold: f64,
    spatial_overlap_threshold: f64,
) -> Vec<Line> {
    let paragraph_words = word_set(paragraph_content);
    let mut matched: Vec<Line> = lines
        .iter()
        .filter(|line| {
            word_overlap(&line.content, &paragraph_words) > word_overlap_threshold
                && overlap_ratio(&line.bounding_box, paragraph_box) > spatial_overlap_threshold
        })
        .cloned()
        .collect();
    matched.sort_by(|a, b| cmp_mean_y(&a.bounding_box, &b.bounding_box));
    matched
}

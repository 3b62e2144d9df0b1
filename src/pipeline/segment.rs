//! Sentence segmentation over a list of lines.
//!
//! ## Two passes
//!
//! 1. A general-purpose [`SentenceSplitter`] proposes boundaries over the
//!    concatenated line text. The default is Unicode sentence segmentation
//!    (UAX #29) from `unicode-segmentation`.
//! 2. An ordered table of [`Rule`]s walks the tokens and forces or suppresses
//!    boundaries. General splitters are tuned for prose; technical manuals
//!    are full of bullets, numbered steps and abbreviations.
//!
//! ## Offsets
//!
//! Lines are joined with a single space. Each line's `[start, end)` byte
//! range in the joined text is kept, and a sentence overlaps a line when
//! `line.start < sentence.end && line.end > sentence.start`. The sentence's
//! box is the envelope of the lines it overlaps.

use crate::error::SegmentError;
use crate::geometry::envelope;
use crate::output::{Line, Sentence};
use std::sync::Arc;
use tracing::{trace, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into sentences.
pub trait SentenceSplitter: Send + Sync {
    /// Byte offsets at which sentences start.
    fn sentence_starts(&self, text: &str) -> Result<Vec<usize>, SegmentError>;
}

/// [`SentenceSplitter`] using Unicode sentence boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentenceSplitter;

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn sentence_starts(&self, text: &str) -> Result<Vec<usize>, SegmentError> {
        Ok(text.split_sentence_bound_indices().map(|(start, _)| start).collect())
    }
}

const BULLETS: &[char] = &['•', '∙', '·', '○', '●', '-', '–', '—'];

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "dr", "ms", "prof", "sr", "jr", "inc", "ltd", "co", "etc", "vs", "fig", "et", "al",
    "e.g", "i.e", "vol", "pg", "pp",
];

const LEADING_PUNCT: &[char] = &['(', '[', '{', '"', '\'', '“', '‘'];
const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\'', '”', '’'];

/// A whitespace-delimited token with punctuation peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Split on whitespace, then peel leading openers and trailing closers and
/// terminators into tokens of their own. Internal dots stay (`e.g`, `U.S`).
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chunk_start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = chunk_start.take() {
                split_chunk(text, start, i, &mut tokens);
            }
        } else if chunk_start.is_none() {
            chunk_start = Some(i);
        }
    }
    if let Some(start) = chunk_start {
        split_chunk(text, start, text.len(), &mut tokens);
    }
    tokens
}

fn split_chunk<'a>(text: &'a str, start: usize, end: usize, tokens: &mut Vec<Token<'a>>) {
    let mut lo = start;
    let mut hi = end;

    while let Some(c) = text[lo..hi].chars().next() {
        if !LEADING_PUNCT.contains(&c) || hi - lo <= c.len_utf8() {
            break;
        }
        tokens.push(token(text, lo, lo + c.len_utf8()));
        lo += c.len_utf8();
    }

    let mut trailing = Vec::new();
    while let Some(c) = text[lo..hi].chars().next_back() {
        if !TRAILING_PUNCT.contains(&c) || hi - lo <= c.len_utf8() {
            break;
        }
        hi -= c.len_utf8();
        trailing.push(token(text, hi, hi + c.len_utf8()));
    }

    if lo < hi {
        tokens.push(token(text, lo, hi));
    }
    tokens.extend(trailing.into_iter().rev());
}

fn token(text: &str, start: usize, end: usize) -> Token<'_> {
    Token {
        text: &text[start..end],
        start,
        end,
    }
}

// ── Correction rules ─────────────────────────────────────────────────────

/// What a rule does relative to the token it fired on.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// Start a sentence at `i + offset`.
    Force(usize),
    /// Make sure no sentence starts at any `i + offset`.
    Suppress(&'static [usize]),
}

/// One entry of the correction table. The first rule whose predicate holds
/// for token `i` is applied; later rules are not consulted for that token.
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&RuleContext<'_>, usize) -> bool,
    pub action: Action,
}

/// Tokens plus the knobs the predicates need.
pub struct RuleContext<'a> {
    pub tokens: &'a [Token<'a>],
    pub list_marker_max_len: usize,
}

impl RuleContext<'_> {
    fn text(&self, i: usize) -> Option<&str> {
        self.tokens.get(i).map(|t| t.text)
    }

    fn is_dot(&self, i: usize) -> bool {
        self.text(i) == Some(".")
    }

    fn is_bullet(&self, i: usize) -> bool {
        self.text(i).is_some_and(|t| {
            let mut chars = t.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if BULLETS.contains(&c))
        })
    }

    fn is_numeral(&self, i: usize) -> bool {
        self.text(i).is_some_and(|t| {
            !t.is_empty() && t.len() <= self.list_marker_max_len && t.chars().all(|c| c.is_ascii_digit())
        })
    }

    fn is_letter(&self, i: usize) -> bool {
        self.text(i).is_some_and(|t| {
            let mut chars = t.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
        })
    }

    /// `1.` / `a.`, spanning tokens `i` and `i + 1`.
    fn is_dotted_marker(&self, i: usize) -> bool {
        (self.is_numeral(i) || self.is_letter(i)) && self.is_dot(i + 1)
    }

    fn is_marker(&self, i: usize) -> bool {
        self.is_bullet(i) || self.is_dotted_marker(i)
    }
}

fn next_is_list_marker(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_marker(i + 1)
}

fn consecutive_markers(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_dotted_marker(i) && ctx.is_marker(i + 2)
}

fn marker_keeps_item_body(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_dotted_marker(i)
}

fn abbreviation(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_dot(i + 1)
        && ctx
            .text(i)
            .is_some_and(|t| ABBREVIATIONS.contains(&t.to_lowercase().as_str()))
}

fn uppercase_initial(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_dot(i + 1)
        && ctx.text(i).is_some_and(|t| {
            let mut chars = t.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
        })
}

fn ellipsis(ctx: &RuleContext<'_>, i: usize) -> bool {
    ctx.is_dot(i) && ctx.is_dot(i + 1)
}

/// The correction table, in priority order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "next_is_list_marker",
        applies: next_is_list_marker,
        action: Action::Force(1),
    },
    Rule {
        name: "consecutive_markers",
        applies: consecutive_markers,
        action: Action::Force(2),
    },
    Rule {
        name: "marker_keeps_item_body",
        applies: marker_keeps_item_body,
        action: Action::Suppress(&[2]),
    },
    Rule {
        name: "abbreviation",
        applies: abbreviation,
        action: Action::Suppress(&[1, 2]),
    },
    Rule {
        name: "uppercase_initial",
        applies: uppercase_initial,
        action: Action::Suppress(&[1, 2]),
    },
    Rule {
        name: "ellipsis",
        applies: ellipsis,
        action: Action::Suppress(&[1]),
    },
];

/// Apply [`RULES`] to per-token start flags. The first token always starts
/// a sentence.
pub fn apply_rules(ctx: &RuleContext<'_>, starts: &mut [bool]) {
    let n = ctx.tokens.len().min(starts.len());
    for i in 0..n {
        let Some(rule) = RULES.iter().find(|r| (r.applies)(ctx, i)) else {
            continue;
        };
        trace!("rule {} fired at token {} ({:?})", rule.name, i, ctx.tokens[i].text);
        match rule.action {
            Action::Force(offset) => {
                if let Some(flag) = starts.get_mut(i + offset) {
                    *flag = true;
                }
            }
            Action::Suppress(offsets) => {
                for offset in offsets {
                    if let Some(flag) = starts.get_mut(i + offset) {
                        *flag = false;
                    }
                }
            }
        }
    }
    if let Some(first) = starts.first_mut() {
        *first = true;
    }
}

// ── Segmenter ────────────────────────────────────────────────────────────

/// Byte range of one line inside the joined text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOffset {
    /// Index into the line list handed to the segmenter.
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

/// Join non-empty lines with single spaces and record each line's range.
pub fn join_lines(lines: &[Line]) -> (String, Vec<LineOffset>) {
    let mut text = String::new();
    let mut offsets = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let content = line.content.trim();
        if content.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        let start = text.len();
        text.push_str(content);
        offsets.push(LineOffset {
            line: index,
            start,
            end: text.len(),
        });
    }
    (text, offsets)
}

/// Splitter plus boundary corrections.
#[derive(Clone)]
pub struct SentenceSegmenter {
    splitter: Option<Arc<dyn SentenceSplitter>>,
    list_marker_max_len: usize,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SentenceSegmenter {
    /// Segmenter over [`UnicodeSentenceSplitter`].
    pub fn new(list_marker_max_len: usize) -> Self {
        Self {
            splitter: Some(Arc::new(UnicodeSentenceSplitter)),
            list_marker_max_len,
        }
    }

    pub fn with_splitter(splitter: Arc<dyn SentenceSplitter>, list_marker_max_len: usize) -> Self {
        Self {
            splitter: Some(splitter),
            list_marker_max_len,
        }
    }

    /// A segmenter with no splitter; every call yields no sentences.
    pub fn unavailable() -> Self {
        Self {
            splitter: None,
            list_marker_max_len: 2,
        }
    }

    /// Segment `lines` into sentences belonging to `page_number`.
    ///
    /// `lines` may be any subset of a page's lines in any order; a sentence's
    /// `overlapping_lines` holds the `line_index` of each line it touches.
    /// `sentence_index` counts from zero within this call. When the splitter
    /// is missing or fails the result is empty.
    pub fn segment(&self, lines: &[Line], page_number: u32, paragraph_index: Option<usize>) -> Vec<Sentence> {
        let (text, offsets) = join_lines(lines);
        if text.is_empty() {
            return Vec::new();
        }

        let Some(splitter) = &self.splitter else {
            warn!("No sentence splitter available; page {} gets no sentences", page_number);
            return Vec::new();
        };
        let boundaries = match splitter.sentence_starts(&text) {
            Ok(b) => b,
            Err(e) => {
                warn!("{}; page {} scope gets no sentences", e, page_number);
                return Vec::new();
            }
        };

        let tokens = tokenize(&text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut starts = vec![false; tokens.len()];
        for offset in boundaries {
            if let Some(i) = tokens.iter().position(|t| t.start >= offset) {
                starts[i] = true;
            }
        }

        let ctx = RuleContext {
            tokens: &tokens,
            list_marker_max_len: self.list_marker_max_len,
        };
        apply_rules(&ctx, &mut starts);

        let mut groups: Vec<(usize, usize)> = Vec::new();
        for (i, &is_start) in starts.iter().enumerate() {
            if is_start || groups.is_empty() {
                groups.push((i, i));
            } else if let Some(last) = groups.last_mut() {
                last.1 = i;
            }
        }

        groups
            .into_iter()
            .filter_map(|(first, last)| {
                let start = tokens[first].start;
                let end = tokens[last].end;
                let overlapping: Vec<&Line> = offsets
                    .iter()
                    .filter(|o| o.start < end && o.end > start)
                    .map(|o| &lines[o.line])
                    .collect();
                let bounding_box = envelope(overlapping.iter().map(|l| &l.bounding_box))?;
                let mut line_indices: Vec<usize> = overlapping.iter().map(|l| l.line_index).collect();
                line_indices.sort_unstable();
                line_indices.dedup();
                Some((text[start..end].to_string(), bounding_box, (start, end), line_indices))
            })
            .enumerate()
            .map(|(sentence_index, (content, bounding_box, char_span, overlapping_lines))| Sentence {
                content,
                bounding_box,
                char_span,
                overlapping_lines,
                page_number,
                sentence_index,
                paragraph_index,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingPolygon;

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let top = 0.1 + i as f64 * 0.02;
                Line {
                    content: t.to_string(),
                    bounding_box: BoundingPolygon::from_rect(0.1, top, 0.8, top + 0.015),
                    page_number: 1,
                    line_index: i,
                    confidence: None,
                }
            })
            .collect()
    }

    fn contents(sentences: &[Sentence]) -> Vec<&str> {
        sentences.iter().map(|s| s.content.as_str()).collect()
    }

    struct FailingSplitter;

    impl SentenceSplitter for FailingSplitter {
        fn sentence_starts(&self, _text: &str) -> Result<Vec<usize>, SegmentError> {
            Err(SegmentError("model not loaded".into()))
        }
    }

    #[test]
    fn tokenizer_peels_punctuation_but_keeps_internal_dots() {
        let toks: Vec<_> = tokenize("(see e.g., fig. 3)...").into_iter().map(|t| t.text).collect();
        assert_eq!(toks, vec!["(", "see", "e.g", ".", ",", "fig", ".", "3", ")", ".", ".", "."]);
    }

    #[test]
    fn tokenizer_offsets_index_the_text() {
        let text = "“Stop” now.";
        for t in tokenize(text) {
            assert_eq!(&text[t.start..t.end], t.text);
        }
    }

    #[test]
    fn numbered_steps_align_with_lines() {
        let input = lines(&["1. Turn off power.", "2. Remove the cover.", "See fig. 3 for details."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, Some(0));
        assert_eq!(
            contents(&sentences),
            vec!["1. Turn off power.", "2. Remove the cover.", "See fig. 3 for details."]
        );
        for (i, s) in sentences.iter().enumerate() {
            assert_eq!(s.overlapping_lines, vec![i]);
            assert_eq!(s.sentence_index, i);
            assert_eq!(s.paragraph_index, Some(0));
            assert_eq!(s.bounding_box, input[i].bounding_box);
        }
        assert_eq!(sentences[0].char_span, (0, 18));
    }

    #[test]
    fn bullet_forces_boundary() {
        let input = lines(&["Check the following • oil level • belt tension"]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(
            contents(&sentences),
            vec!["Check the following", "• oil level", "• belt tension"]
        );
    }

    #[test]
    fn abbreviation_does_not_end_sentence() {
        let input = lines(&["Contact Dr. Smith about the valve. He knows it."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(
            contents(&sentences),
            vec!["Contact Dr. Smith about the valve.", "He knows it."]
        );
    }

    #[test]
    fn sentence_spanning_two_lines_overlaps_both() {
        let input = lines(&["Tighten the bolts to", "12 Nm in a cross pattern. Then", "check again."]);
        let sentences = SentenceSegmenter::default().segment(&input, 2, None);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].overlapping_lines, vec![0, 1]);
        assert_eq!(sentences[1].overlapping_lines, vec![1, 2]);
        assert_eq!(sentences[0].bounding_box.min_y(), input[0].bounding_box.min_y());
        assert_eq!(sentences[0].bounding_box.max_y(), input[1].bounding_box.max_y());
        assert!(sentences.iter().all(|s| s.page_number == 2));
    }

    #[test]
    fn empty_lines_are_skipped_but_indices_kept() {
        let input = lines(&["First part.", "   ", "Second part."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1].overlapping_lines, vec![2]);
    }

    #[test]
    fn overlapping_lines_report_page_line_indices() {
        let mut input = lines(&["Warranty void", "if removed."]);
        input[0].line_index = 7;
        input[1].line_index = 4;
        let sentences = SentenceSegmenter::default().segment(&input, 1, Some(1));
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].overlapping_lines, vec![4, 7]);
    }

    #[test]
    fn leading_bullet_starts_each_item() {
        let input = lines(&["• Check the oil level. • Check belt tension."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(
            contents(&sentences),
            vec!["• Check the oil level.", "• Check belt tension."]
        );
        assert_eq!(sentences[0].char_span.0, 0);
    }

    #[test]
    fn uppercase_initial_stays_with_the_name() {
        let input = lines(&["J. Smith signed the form. It was filed."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(contents(&sentences), vec!["J. Smith signed the form.", "It was filed."]);

        let tokens = tokenize("J. Smith j. smith");
        let ctx = RuleContext {
            tokens: &tokens,
            list_marker_max_len: 2,
        };
        assert!(uppercase_initial(&ctx, 0));
        assert!(!uppercase_initial(&ctx, 2));
        assert!(!uppercase_initial(&ctx, 3));
    }

    #[test]
    fn ellipsis_is_never_split() {
        let input = lines(&["Wait... then continue."]);
        let sentences = SentenceSegmenter::default().segment(&input, 1, None);
        assert_eq!(contents(&sentences), vec!["Wait... then continue."]);

        let tokens = tokenize("Wait... then");
        let ctx = RuleContext {
            tokens: &tokens,
            list_marker_max_len: 2,
        };
        assert!(ellipsis(&ctx, 1));
        let mut starts = vec![true, false, true, true, false];
        apply_rules(&ctx, &mut starts);
        assert_eq!(starts, vec![true, false, false, false, false]);
    }

    #[test]
    fn failing_splitter_yields_no_sentences() {
        let seg = SentenceSegmenter::with_splitter(Arc::new(FailingSplitter), 2);
        assert!(seg.segment(&lines(&["Anything at all."]), 1, None).is_empty());
        assert!(SentenceSegmenter::unavailable()
            .segment(&lines(&["Anything at all."]), 1, None)
            .is_empty());
    }

    #[test]
    fn consecutive_markers_split() {
        let tokens = tokenize("1. 2. Remove");
        let ctx = RuleContext {
            tokens: &tokens,
            list_marker_max_len: 2,
        };
        let mut starts = vec![false; tokens.len()];
        apply_rules(&ctx, &mut starts);
        assert_eq!(starts, vec![true, false, true, false, false]);
    }

    #[test]
    fn long_numbers_are_not_markers() {
        let tokens = tokenize("in 2024. Next");
        let ctx = RuleContext {
            tokens: &tokens,
            list_marker_max_len: 2,
        };
        assert!(!ctx.is_marker(1));
    }
}

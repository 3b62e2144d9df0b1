//! Fragment merging for direct-extraction blocks.
//!
//! The local parser often splits one logical paragraph into several blocks
//! (a heading and its first sentence, a wrapped caption, a list item per
//! block). A text block with fewer than `threshold` words is folded into the
//! block that follows it. The merged block is tested again against its new
//! successor, so a run of short blocks collapses into one.

use crate::geometry::envelope;
use crate::raw::RawBlock;
use tracing::debug;

/// Merge short text blocks into their successor.
///
/// Only consecutive text blocks merge; image blocks pass through and break a
/// chain. Line lists are concatenated in order and the box becomes the
/// envelope of both. Returns the merged blocks and the number of merges
/// performed.
pub fn merge_fragments(blocks: Vec<RawBlock>, threshold: usize) -> (Vec<RawBlock>, usize) {
    let mut out: Vec<RawBlock> = Vec::with_capacity(blocks.len());
    let mut merges = 0usize;
    let mut pending: Option<RawBlock> = None;

    for block in blocks {
        let current = match pending.take() {
            Some(prev) if prev.is_text() && block.is_text() && prev.word_count() < threshold => {
                merges += 1;
                absorb(prev, block)
            }
            Some(prev) => {
                out.push(prev);
                block
            }
            None => block,
        };
        pending = Some(current);
    }

    if let Some(last) = pending {
        out.push(last);
    }

    if merges > 0 {
        debug!("Merged {} fragment block(s) into {} block(s)", merges, out.len());
    }
    (out, merges)
}

fn absorb(mut head: RawBlock, tail: RawBlock) -> RawBlock {
    if let Some(bbox) = envelope([&head.bbox, &tail.bbox]) {
        head.bbox = bbox;
    }
    head.lines.extend(tail.lines);
    head
}

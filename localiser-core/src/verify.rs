use std::collections::HashMap;

use crate::encoder::{EncodeMode, EncodeReport, SegmentStatus};
use crate::markup::Normalizer;
use crate::scanner::{find_sentinel, scan};
use crate::segment::{encode_utf16le, Segment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub output_segments: usize,
    /// Segments the encoder reported as rewritten.
    pub translated: usize,
    /// Rewritten segments found at their relocated offset with the
    /// expected text.
    pub confirmed: usize,
    /// Indices of rewritten segments that could not be confirmed.
    pub unconfirmed: Vec<usize>,
    /// Sentinel and everything after it are byte-identical.
    pub tail_preserved: bool,
    /// Every segment kept its byte span (always true in resizing mode).
    pub spans_preserved: bool,
    pub size_delta: isize,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.tail_preserved && self.spans_preserved && self.unconfirmed.is_empty()
    }
}

/// Offset of the first occurrence of `term` encoded as UTF-16LE.
pub fn find_utf16(buf: &[u8], term: &str) -> Option<usize> {
    let needle = encode_utf16le(term);
    if needle.is_empty() || needle.len() > buf.len() {
        return None;
    }
    buf.windows(needle.len()).position(|w| w == needle.as_slice())
}

fn tail_matches(original: &[u8], output: &[u8], report: &EncodeReport, tail_start: usize) -> bool {
    let new_start = report.relocate(tail_start);
    new_start <= output.len() && output[new_start..] == original[tail_start..]
}

/// Re-scan an encoded buffer and check it against what the encoder claims
/// to have done. `segments` are the input segments, translations included.
pub fn verify(
    original: &[u8],
    segments: &[Segment],
    report: &EncodeReport,
    start_offset: usize,
    normalizer: &Normalizer,
) -> VerifyReport {
    let output = report.bytes.as_slice();

    let after_records = segments
        .last()
        .map_or(start_offset, |s| s.content_end)
        .min(original.len());
    let tail_start = find_sentinel(original, after_records).unwrap_or(after_records);
    let tail_preserved = tail_matches(original, output, report, tail_start);

    let spans_preserved = match report.mode {
        EncodeMode::FixedSlot => report.relocations.iter().all(|r| {
            r.new_prefix == r.old_prefix && r.new_end - r.new_prefix == r.old_end - r.old_prefix
        }),
        EncodeMode::Resizing => true,
    };

    let rescanned = scan(output, report.relocate(start_offset));
    let by_offset: HashMap<usize, &Segment> = rescanned
        .segments
        .iter()
        .map(|s| (s.prefix_offset, s))
        .collect();
    let by_index: HashMap<usize, &Segment> = segments.iter().map(|s| (s.index, s)).collect();

    let mut translated = 0usize;
    let mut confirmed = 0usize;
    let mut unconfirmed = Vec::new();

    for outcome in &report.outcomes {
        let truncated = match outcome.status {
            SegmentStatus::Replaced { .. } => false,
            SegmentStatus::Truncated { .. } => true,
            _ => continue,
        };
        translated += 1;

        let expected = by_index
            .get(&outcome.index)
            .and_then(|s| s.pending_translation())
            .map(|t| normalizer.to_storage(t).into_owned());
        let found = by_offset.get(&report.relocate(outcome.prefix_offset));

        let ok = match (expected, found) {
            (Some(expected), Some(seg)) => {
                let written = seg.raw_text.trim_end_matches(' ');
                let expected = expected.trim_end_matches(' ');
                if truncated {
                    !written.is_empty() && expected.starts_with(written)
                } else {
                    written == expected
                }
            }
            _ => false,
        };

        if ok {
            confirmed += 1;
        } else {
            log::warn!("[{}] rewritten text not found in output", outcome.index);
            unconfirmed.push(outcome.index);
        }
    }

    VerifyReport {
        output_segments: rescanned.segments.len(),
        translated,
        confirmed,
        unconfirmed,
        tail_preserved,
        spans_preserved,
        size_delta: report.size_delta(original.len()),
    }
}

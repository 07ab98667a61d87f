use serde::{Deserialize, Serialize};

use crate::markup::Normalizer;
use crate::segment::{Segment, HEADER_WIDTH, LENGTH_BYTE_OFFSET, MAX_UNITS};

/// How a replacement is fitted into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodeMode {
    /// Pad or truncate to the original payload span. No offset moves.
    #[default]
    FixedSlot,
    /// Write exactly the new payload and rewrite the length byte. Every
    /// later offset shifts; callers must re-resolve back-references with
    /// [`EncodeReport::relocate`].
    Resizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub mode: EncodeMode,
    /// Leave segments the classifier rejected untouched even when a
    /// translation addresses them.
    pub valid_only: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            mode: EncodeMode::FixedSlot,
            valid_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentStatus {
    /// No translation; original bytes copied.
    Kept,
    Replaced { units: u8 },
    /// The translation did not fit and was cut to `written` units.
    Truncated { requested: usize, written: u8 },
    /// The translation could not be represented; original bytes copied.
    Retained,
    /// A translation was supplied for a segment marked invalid.
    SkippedInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub index: usize,
    pub prefix_offset: usize,
    pub status: SegmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub old_prefix: usize,
    pub new_prefix: usize,
    pub old_end: usize,
    pub new_end: usize,
}

#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub bytes: Vec<u8>,
    pub mode: EncodeMode,
    pub outcomes: Vec<SegmentOutcome>,
    pub relocations: Vec<Relocation>,
}

impl EncodeReport {
    pub fn changed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    SegmentStatus::Replaced { .. } | SegmentStatus::Truncated { .. }
                )
            })
            .count()
    }

    pub fn size_delta(&self, original_len: usize) -> isize {
        self.bytes.len() as isize - original_len as isize
    }

    /// Map an offset in the input buffer to the matching offset in the
    /// output. Offsets inside a rewritten payload map to its start.
    pub fn relocate(&self, old_offset: usize) -> usize {
        let mut shift: isize = 0;
        for r in &self.relocations {
            if old_offset < r.old_prefix {
                break;
            }
            if old_offset < r.old_end {
                let header_end = r.old_prefix + HEADER_WIDTH;
                if old_offset < header_end {
                    return r.new_prefix + (old_offset - r.old_prefix);
                }
                return r.new_prefix + HEADER_WIDTH;
            }
            shift = r.new_end as isize - r.old_end as isize;
        }
        (old_offset as isize + shift) as usize
    }
}

/// Longest prefix of `text` whose UTF-16 form fits in `max_units`, never
/// splitting a surrogate pair.
fn truncate_units(text: &str, max_units: usize) -> Vec<u16> {
    let mut out = Vec::with_capacity(max_units);
    let mut tmp = [0u16; 2];
    for c in text.chars() {
        let encoded = c.encode_utf16(&mut tmp);
        if out.len() + encoded.len() > max_units {
            break;
        }
        out.extend_from_slice(encoded);
    }
    out
}

fn units_to_le(units: &[u16]) -> Vec<u8> {
    units.iter().flat_map(|u| u.to_le_bytes()).collect()
}

/// Build the replacement header+payload for one segment, or `None` when
/// the original bytes must be kept.
fn encode_replacement(
    seg: &Segment,
    translation: &str,
    mode: EncodeMode,
    normalizer: &Normalizer,
) -> (Option<Vec<u8>>, SegmentStatus) {
    let stored = normalizer.to_storage(translation);
    let requested = stored.encode_utf16().count();

    let limit = match mode {
        EncodeMode::FixedSlot => seg.declared_unit_count as usize,
        EncodeMode::Resizing => MAX_UNITS as usize,
    };

    let mut units = truncate_units(&stored, limit);
    if units.is_empty() {
        log::warn!(
            "[{}] translation {:?} is not representable, keeping original",
            seg.index,
            translation
        );
        return (None, SegmentStatus::Retained);
    }

    let truncated = units.len() < requested;
    if truncated {
        log::warn!(
            "[{}] translation needs {} units, only {} fit; truncated",
            seg.index,
            requested,
            units.len()
        );
    }

    let written = units.len() as u8;
    if mode == EncodeMode::FixedSlot {
        units.resize(limit, 0x0020);
    }

    let count = units.len() as u8;
    let mut out = Vec::with_capacity(HEADER_WIDTH + units.len() * 2);
    out.extend_from_slice(&seg.metadata);
    out.push(count);
    out.extend_from_slice(&units_to_le(&units));

    let status = if truncated {
        SegmentStatus::Truncated { requested, written }
    } else {
        SegmentStatus::Replaced { units: count }
    };
    (Some(out), status)
}

/// Produce a new buffer with every pending translation written in.
///
/// Bytes between segments, untranslated segments and everything after the
/// last segment (sentinel included) are copied verbatim. Segments must be
/// the offset-ordered output of a scan of `original`.
pub fn encode(
    original: &[u8],
    segments: &[Segment],
    options: EncodeOptions,
    normalizer: &Normalizer,
) -> EncodeReport {
    let mut out = Vec::with_capacity(original.len());
    let mut outcomes = Vec::with_capacity(segments.len());
    let mut relocations = Vec::with_capacity(segments.len());
    let mut cursor = 0usize;

    for seg in segments {
        let in_place = seg.prefix_offset >= cursor
            && seg.content_start == seg.prefix_offset + HEADER_WIDTH
            && seg.content_end >= seg.content_start
            && seg.content_end <= original.len()
            && original[seg.prefix_offset + LENGTH_BYTE_OFFSET] == seg.declared_unit_count;
        if !in_place {
            log::warn!(
                "[{}] segment at 0x{:X} is out of order or does not match this buffer, skipped",
                seg.index,
                seg.prefix_offset
            );
            continue;
        }

        out.extend_from_slice(&original[cursor..seg.prefix_offset]);
        let new_prefix = out.len();

        let (replacement, status) = match seg.pending_translation() {
            None => (None, SegmentStatus::Kept),
            Some(_) if options.valid_only && !seg.is_valid => {
                log::debug!("[{}] translation ignored: segment is not valid text", seg.index);
                (None, SegmentStatus::SkippedInvalid)
            }
            Some(text) => encode_replacement(seg, text, options.mode, normalizer),
        };

        match replacement {
            Some(bytes) => out.extend_from_slice(&bytes),
            None => out.extend_from_slice(&original[seg.span()]),
        }

        relocations.push(Relocation {
            old_prefix: seg.prefix_offset,
            new_prefix,
            old_end: seg.content_end,
            new_end: out.len(),
        });
        outcomes.push(SegmentOutcome {
            index: seg.index,
            prefix_offset: seg.prefix_offset,
            status,
        });
        cursor = seg.content_end;
    }

    out.extend_from_slice(&original[cursor..]);

    let report = EncodeReport {
        bytes: out,
        mode: options.mode,
        outcomes,
        relocations,
    };
    log::info!(
        "encoded {} of {} segments ({:?}), size {} -> {}",
        report.changed(),
        segments.len(),
        options.mode,
        original.len(),
        report.bytes.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use crate::segment::{encode_utf16le, SENTINEL};

    fn record(meta: [u8; 4], text: &str) -> Vec<u8> {
        let payload = encode_utf16le(text);
        let mut out = meta.to_vec();
        out.push((payload.len() / 2) as u8);
        out.extend_from_slice(&payload);
        out
    }

    fn two_record_buffer() -> Vec<u8> {
        let mut buf = vec![0x01, 0x02, 0x03];
        buf.extend_from_slice(&record([0xA0, 0, 0, 0], "カードを引く"));
        buf.extend_from_slice(&[0x77, 0x88]);
        buf.extend_from_slice(&record([0xB0, 0, 0, 0], "ターン終了"));
        buf.extend_from_slice(&SENTINEL);
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        buf
    }

    fn scanned(buf: &[u8]) -> Vec<Segment> {
        let mut segs = scan(buf, 0).segments;
        for s in &mut segs {
            s.is_valid = true;
        }
        segs
    }

    #[test]
    fn no_translations_reproduces_input() {
        let buf = two_record_buffer();
        let segs = scanned(&buf);
        for mode in [EncodeMode::FixedSlot, EncodeMode::Resizing] {
            let opts = EncodeOptions { mode, valid_only: true };
            let report = encode(&buf, &segs, opts, &Normalizer::default());
            assert_eq!(report.bytes, buf);
            assert!(report.outcomes.iter().all(|o| o.status == SegmentStatus::Kept));
        }
    }

    #[test]
    fn fixed_slot_pads_short_translation() {
        let mut buf = record([0, 0, 0, 0], "カード");
        buf.extend_from_slice(&SENTINEL);
        let mut segs = scanned(&buf);
        segs[0].translation = Some("Hi".to_string());

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes.len(), buf.len());
        assert_eq!(report.bytes[4], 0x03);
        assert_eq!(&report.bytes[5..11], &[0x48, 0x00, 0x69, 0x00, 0x20, 0x00]);
        assert_eq!(&report.bytes[11..], &SENTINEL);
        assert_eq!(report.outcomes[0].status, SegmentStatus::Replaced { units: 3 });
    }

    #[test]
    fn fixed_slot_truncates_long_translation() {
        let buf = two_record_buffer();
        let mut segs = scanned(&buf);
        segs[1].translation = Some("End of turn phase".to_string());

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes.len(), buf.len());
        let seg = &segs[1];
        assert_eq!(
            &report.bytes[seg.content_start..seg.content_end],
            encode_utf16le("End o").as_slice()
        );
        assert_eq!(
            report.outcomes[1].status,
            SegmentStatus::Truncated { requested: 17, written: 5 }
        );
        assert_eq!(report.relocate(seg.content_end), seg.content_end);
    }

    #[test]
    fn resizing_rewrites_length_and_shifts_tail() {
        let buf = two_record_buffer();
        let mut segs = scanned(&buf);
        segs[0].translation = Some("Draw".to_string());
        let opts = EncodeOptions { mode: EncodeMode::Resizing, valid_only: true };

        let report = encode(&buf, &segs, opts, &Normalizer::default());
        // "カードを引く" is 6 units, "Draw" is 4: two units shorter.
        assert_eq!(report.size_delta(buf.len()), -4);
        assert_eq!(report.bytes[3 + 4], 4);
        assert_eq!(&report.bytes[3..7], &[0xA0, 0, 0, 0]);

        let second_old = segs[1].prefix_offset;
        let second_new = report.relocate(second_old);
        assert_eq!(second_new, second_old - 4);
        assert_eq!(report.bytes[second_new], 0xB0);

        let tail = buf.len() - 9;
        assert_eq!(&report.bytes[report.bytes.len() - 9..], &buf[tail..]);
    }

    #[test]
    fn resizing_caps_at_max_units() {
        let mut buf = record([0; 4], "カード");
        buf.extend_from_slice(&SENTINEL);
        let mut segs = scanned(&buf);
        segs[0].translation = Some("x".repeat(250));
        let opts = EncodeOptions { mode: EncodeMode::Resizing, valid_only: true };

        let report = encode(&buf, &segs, opts, &Normalizer::default());
        assert_eq!(report.bytes[4], MAX_UNITS);
        assert_eq!(report.bytes.len(), buf.len() - 6 + 400);
        assert_eq!(
            report.outcomes[0].status,
            SegmentStatus::Truncated { requested: 250, written: 200 }
        );
    }

    #[test]
    fn truncation_keeps_surrogate_pairs_whole() {
        let mut buf = record([0; 4], "カー");
        buf.extend_from_slice(&SENTINEL);
        let mut segs = scanned(&buf);
        // U+1F0A1 takes two units, so only 'a' fits in the two-unit slot.
        segs[0].translation = Some("a\u{1F0A1}".to_string());

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(&report.bytes[5..9], &[0x61, 0x00, 0x20, 0x00]);
        assert_eq!(
            report.outcomes[0].status,
            SegmentStatus::Truncated { requested: 3, written: 1 }
        );
    }

    #[test]
    fn newlines_become_marker_units() {
        let mut buf = record([0; 4], "カードを引く");
        buf.extend_from_slice(&SENTINEL);
        let mut segs = scanned(&buf);
        segs[0].translation = Some("A\nB".to_string());

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(&report.bytes[5..11], encode_utf16le("A†B").as_slice());
    }

    #[test]
    fn invalid_segments_are_left_alone_when_requested() {
        let buf = two_record_buffer();
        let mut segs = scanned(&buf);
        segs[0].is_valid = false;
        segs[0].translation = Some("Draw".to_string());

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes, buf);
        assert_eq!(report.outcomes[0].status, SegmentStatus::SkippedInvalid);

        let opts = EncodeOptions { valid_only: false, ..EncodeOptions::default() };
        let report = encode(&buf, &segs, opts, &Normalizer::default());
        assert_ne!(report.bytes, buf);
    }

    #[test]
    fn out_of_order_or_foreign_segments_are_skipped() {
        let buf = two_record_buffer();
        let mut segs = scanned(&buf);
        segs[0].translation = Some("Draw".to_string());
        segs[1].translation = Some("End".to_string());
        segs.reverse();

        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes.len(), buf.len());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].index, 2);
        assert!(crate::verify::find_utf16(&report.bytes, "カードを引く").is_some());

        let short = buf[..10].to_vec();
        let report = encode(&short, &scanned(&buf), EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes, short);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn unrepresentable_translation_keeps_original() {
        let buf = two_record_buffer();
        let mut segs = scanned(&buf);
        let mut small = record([0; 4], "カ");
        small.extend_from_slice(&SENTINEL);
        let mut small_segs = scanned(&small);
        small_segs[0].translation = Some("\u{1F0A1}".to_string());

        let report = encode(&small, &small_segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.bytes, small);
        assert_eq!(report.outcomes[0].status, SegmentStatus::Retained);

        segs[0].translation = Some(String::new());
        let report = encode(&buf, &segs, EncodeOptions::default(), &Normalizer::default());
        assert_eq!(report.outcomes[0].status, SegmentStatus::Kept);
    }
}

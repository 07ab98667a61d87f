use crate::segment::{
    decode_utf16le, is_unit_count_in_range, Segment, HEADER_WIDTH, LENGTH_BYTE_OFFSET,
    NEWLINE_MARKER, SENTINEL,
};

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// Reached the terminating sentinel at this offset.
    Sentinel(usize),
    /// Ran out of bytes without seeing a sentinel.
    EndOfBuffer,
    /// A header at `offset` declared more payload than the buffer holds.
    /// Everything from here on is left as opaque binary.
    Truncated { offset: usize, declared_units: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub segments: Vec<Segment>,
    pub sentinel: Option<usize>,
    pub stop: ScanStop,
}

impl ScanReport {
    pub fn is_truncated(&self) -> bool {
        matches!(self.stop, ScanStop::Truncated { .. })
    }
}

/// Offset of the first sentinel at or after `start`.
pub fn find_sentinel(buf: &[u8], start: usize) -> Option<usize> {
    if start >= buf.len() {
        return None;
    }
    buf[start..]
        .windows(SENTINEL.len())
        .position(|w| w == SENTINEL)
        .map(|p| start + p)
}

fn is_recognised_char(c: char) -> bool {
    if c == NEWLINE_MARKER || c == '\n' || c == '\r' {
        return true;
    }
    let cp = c as u32;
    let private_use = (0xE000..=0xF8FF).contains(&cp)
        || (0xF0000..=0xFFFFD).contains(&cp)
        || (0x100000..=0x10FFFD).contains(&cp);
    let nonchar = (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE;
    !c.is_control() && !private_use && !nonchar
}

fn is_sentinel_at(buf: &[u8], pos: usize) -> bool {
    buf.get(pos..pos + SENTINEL.len()) == Some(&SENTINEL[..])
}

/// Walk `buf` from `start` and collect every plausible text record.
///
/// The format has no record table, so each byte offset is tried as a
/// header. After a record is accepted scanning resumes at its
/// `content_end`; otherwise it advances a single byte. The sentinel only
/// ends the scan when it sits at an offset the scan actually visits, so
/// sentinel-shaped bytes inside a consumed payload are ignored. Never
/// fails: a header whose payload runs past the end of the buffer ends the
/// scan with [`ScanStop::Truncated`] and keeps what was found so far.
pub fn scan(buf: &[u8], start: usize) -> ScanReport {
    let mut segments: Vec<Segment> = Vec::new();
    let mut sentinel = None;
    let mut pos = start;

    let stop = loop {
        if pos.saturating_add(HEADER_WIDTH) > buf.len() {
            break ScanStop::EndOfBuffer;
        }
        if is_sentinel_at(buf, pos) {
            sentinel = Some(pos);
            break ScanStop::Sentinel(pos);
        }

        let units = buf[pos + LENGTH_BYTE_OFFSET];
        if !is_unit_count_in_range(units) {
            pos += 1;
            continue;
        }

        let content_start = pos + HEADER_WIDTH;
        let content_end = content_start + units as usize * 2;

        if content_end > buf.len() {
            log::warn!(
                "header at 0x{:X} declares {} units past end of buffer (len 0x{:X}), stopping scan",
                pos,
                units,
                buf.len()
            );
            break ScanStop::Truncated {
                offset: pos,
                declared_units: units,
            };
        }

        let raw_text = decode_utf16le(&buf[content_start..content_end]);
        if !raw_text.chars().any(is_recognised_char) {
            pos += 1;
            continue;
        }

        let mut metadata = [0u8; 4];
        metadata.copy_from_slice(&buf[pos..pos + LENGTH_BYTE_OFFSET]);

        log::debug!(
            "[{}] prefix@0x{:X}: L={} -> {} bytes",
            segments.len() + 1,
            pos,
            units,
            content_end - content_start
        );

        segments.push(Segment {
            index: segments.len() + 1,
            prefix_offset: pos,
            metadata,
            declared_unit_count: units,
            content_start,
            content_end,
            raw_text,
            clean_text: String::new(),
            is_valid: false,
            translation: None,
        });

        pos = content_end;
    };

    ScanReport {
        segments,
        sentinel,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::encode_utf16le;

    fn record(meta: [u8; 4], text: &str) -> Vec<u8> {
        let payload = encode_utf16le(text);
        let mut out = meta.to_vec();
        out.push((payload.len() / 2) as u8);
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn single_record_then_sentinel() {
        let mut buf = record([0, 0, 0, 0], "カード");
        buf.extend_from_slice(&SENTINEL);

        let report = scan(&buf, 0);
        assert_eq!(report.segments.len(), 1);
        let seg = &report.segments[0];
        assert_eq!(seg.index, 1);
        assert_eq!(seg.declared_unit_count, 3);
        assert_eq!(seg.content_start, 5);
        assert_eq!(seg.content_end, 11);
        assert_eq!(seg.raw_text, "カード");
        assert_eq!(report.sentinel, Some(11));
        assert_eq!(report.stop, ScanStop::Sentinel(11));
    }

    #[test]
    fn zero_and_oversized_length_bytes_are_skipped() {
        // Length byte 0x00 at offset 4 and 0xC9 at offset 5, then a real
        // record starting at offset 2.
        let mut buf = vec![0xAA, 0xBB];
        buf.extend_from_slice(&record([1, 2, 0, 0xC9], "ターン"));
        buf.extend_from_slice(&SENTINEL);

        let report = scan(&buf, 0);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.segments[0].prefix_offset, 2);
        assert_eq!(report.segments[0].metadata, [1, 2, 0, 0xC9]);
    }

    #[test]
    fn resumes_after_consumed_payload() {
        let mut buf = record([0; 4], "ヴァンガード");
        buf.extend_from_slice(&record([9, 9, 9, 9], "ダメージ"));
        buf.extend_from_slice(&SENTINEL);

        let report = scan(&buf, 0);
        let offsets: Vec<usize> = report.segments.iter().map(|s| s.prefix_offset).collect();
        assert_eq!(offsets, vec![0, 17]);
        assert_eq!(report.segments[1].index, 2);
    }

    #[test]
    fn truncated_header_keeps_prior_segments() {
        let mut buf = record([0; 4], "カード");
        // Claims 100 units but only two bytes follow.
        buf.extend_from_slice(&[0, 0, 0, 0, 100, 0x41, 0x00]);

        let report = scan(&buf, 0);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(
            report.stop,
            ScanStop::Truncated {
                offset: 11,
                declared_units: 100
            }
        );
        assert!(report.is_truncated());
        assert_eq!(report.sentinel, None);
    }

    #[test]
    fn stops_at_a_visited_sentinel() {
        let mut buf = vec![0x11];
        buf.extend_from_slice(&SENTINEL);
        buf.extend_from_slice(&record([0; 4], "カード"));

        let report = scan(&buf, 0);
        assert!(report.segments.is_empty());
        assert_eq!(report.stop, ScanStop::Sentinel(1));
        assert_eq!(report.sentinel, Some(1));
    }

    #[test]
    fn sentinel_bytes_straddling_a_record_boundary_are_not_a_stop() {
        // "！" ends in 0xFF and the next header's metadata starts FF FF FF 00,
        // so FF FF FF FF 00 appears at offset 18, inside the first record.
        let mut buf = record([0; 4], "カードを引く！");
        buf.extend_from_slice(&record([0xFF, 0xFF, 0xFF, 0x00], "ターン終了"));
        buf.extend_from_slice(&SENTINEL);
        assert_eq!(find_sentinel(&buf, 0), Some(18));

        let report = scan(&buf, 0);
        let texts: Vec<&str> = report.segments.iter().map(|s| s.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["カードを引く！", "ターン終了"]);
        assert_eq!(report.segments[1].prefix_offset, 19);
        assert_eq!(report.segments[1].metadata, [0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(report.stop, ScanStop::Sentinel(34));
        assert_eq!(report.sentinel, Some(34));
    }

    #[test]
    fn honours_start_offset() {
        let mut buf = record([0; 4], "カード");
        let second = buf.len();
        buf.extend_from_slice(&record([0; 4], "バトル"));
        buf.extend_from_slice(&SENTINEL);

        let report = scan(&buf, second);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.segments[0].prefix_offset, second);
        assert_eq!(report.segments[0].index, 1);
    }

    #[test]
    fn start_past_end_is_empty() {
        let report = scan(&[1, 2, 3], 10);
        assert!(report.segments.is_empty());
        assert_eq!(report.stop, ScanStop::EndOfBuffer);
    }

    #[test]
    fn unprintable_payload_is_not_a_record() {
        // Two NUL units decode to control characters only.
        let mut buf = vec![0, 0, 0, 0, 2, 0, 0, 0, 0];
        buf.extend_from_slice(&SENTINEL);
        let report = scan(&buf, 0);
        assert!(report.segments.is_empty());
    }

    #[test]
    fn scanning_twice_is_identical() {
        let mut buf = record([3, 1, 4, 1], "ドライブチェック");
        buf.extend_from_slice(&[0x10, 0x20, 0x30]);
        buf.extend_from_slice(&record([0; 4], "トリガー"));
        buf.extend_from_slice(&SENTINEL);
        buf.extend_from_slice(&[0xDE, 0xAD]);

        assert_eq!(scan(&buf, 0), scan(&buf, 0));
    }

    #[test]
    fn find_sentinel_respects_start() {
        let mut buf = SENTINEL.to_vec();
        buf.extend_from_slice(&[1, 2]);
        buf.extend_from_slice(&SENTINEL);
        assert_eq!(find_sentinel(&buf, 0), Some(0));
        assert_eq!(find_sentinel(&buf, 1), Some(7));
        assert_eq!(find_sentinel(&buf, 100), None);
    }
}

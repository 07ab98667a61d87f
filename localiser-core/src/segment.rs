use std::collections::BTreeMap;
use std::ops::Range;

/// Width of a record header: 4 opaque metadata bytes plus the length byte.
pub const HEADER_WIDTH: usize = 5;

/// Position of the UTF-16 unit count inside the header.
pub const LENGTH_BYTE_OFFSET: usize = 4;

pub const MIN_UNITS: u8 = 1;
pub const MAX_UNITS: u8 = 200;

/// Terminates the record region. Metadata bytes at 0xFF, length byte zero.
pub const SENTINEL: [u8; HEADER_WIDTH] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// In-game line break. Stored in the payload in place of `\n`.
pub const NEWLINE_MARKER: char = '\u{2020}';

/// Replacement text keyed by the 1-based scan index of a segment.
/// Absent or empty entries mean "keep the original bytes".
pub type Translations = BTreeMap<usize, String>;

/// One text record located inside a resource buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position in scan order.
    pub index: usize,
    pub prefix_offset: usize,
    pub metadata: [u8; 4],
    pub declared_unit_count: u8,
    pub content_start: usize,
    pub content_end: usize,
    pub raw_text: String,
    pub clean_text: String,
    pub is_valid: bool,
    pub translation: Option<String>,
}

impl Segment {
    pub fn payload_len(&self) -> usize {
        self.content_end - self.content_start
    }

    /// Header and payload together.
    pub fn span(&self) -> Range<usize> {
        self.prefix_offset..self.content_end
    }

    /// A translation that would actually be written: present and non-empty.
    pub fn pending_translation(&self) -> Option<&str> {
        self.translation.as_deref().filter(|t| !t.is_empty())
    }
}

pub fn is_unit_count_in_range(units: u8) -> bool {
    (MIN_UNITS..=MAX_UNITS).contains(&units)
}

/// Copy non-empty translations onto the segments they address.
/// Returns how many segments received one. Indices with no matching
/// segment are ignored.
pub fn apply_translations(segments: &mut [Segment], translations: &Translations) -> usize {
    let mut applied = 0usize;
    for seg in segments.iter_mut() {
        match translations.get(&seg.index) {
            Some(text) if !text.is_empty() => {
                seg.translation = Some(text.clone());
                applied += 1;
            }
            _ => {}
        }
    }
    if applied < translations.len() {
        log::debug!(
            "{} translation entries did not address a scanned segment",
            translations.len() - applied
        );
    }
    applied
}

/// Decode little-endian UTF-16, dropping code units that do not form a
/// scalar value (unpaired surrogates, odd trailing byte).
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units).filter_map(|r| r.ok()).collect()
}

pub fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

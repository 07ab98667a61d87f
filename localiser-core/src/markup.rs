use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::segment::Segment;
use crate::terms::TermSet;

// `<|漢字|かんじ|>` as stored, or `<note|漢字|かんじ>`. Keeps the base text.
static RE_RUBY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>|]*\|([^<>|]+)\|[^<>|]*\|?>").unwrap());

// `{$12}`, `{$}` and other dollar-prefixed formatting tags.
static RE_FORMAT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\$[^{}]*\}").unwrap());

static RE_INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Converts between the stored form of a payload and plain text.
///
/// The forward direction is lossy: ruby readings and formatting tags are
/// dropped and are not rebuilt on the way back.
#[derive(Debug, Clone)]
pub struct Normalizer {
    newline_marker: char,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&TermSet::default())
    }
}

impl Normalizer {
    pub fn new(terms: &TermSet) -> Self {
        Self {
            newline_marker: terms.newline_marker,
        }
    }

    /// Stored payload text to clean, translatable text.
    pub fn to_display(&self, raw: &str) -> String {
        let s = RE_RUBY.replace_all(raw, "$1");
        let s = RE_FORMAT_TAG.replace_all(&s, "");
        let s = RE_INLINE_SPACE.replace_all(&s, " ");
        let s = s.replace(self.newline_marker, "\n");
        s.trim().to_string()
    }

    /// Plain text back to the stored form: every line break becomes the
    /// in-game marker.
    pub fn to_storage<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.contains(['\n', '\r']) {
            return Cow::Borrowed(text);
        }
        let marker = self.newline_marker.to_string();
        Cow::Owned(
            text.replace("\r\n", &marker)
                .replace(['\r', '\n'], &marker),
        )
    }

    /// Fill `clean_text` for every segment.
    pub fn normalize_segments(&self, segments: &mut [Segment]) {
        for seg in segments.iter_mut() {
            seg.clean_text = self.to_display(&seg.raw_text);
        }
    }
}

use regex::{Regex, RegexBuilder};

use crate::segment::Segment;
use crate::terms::TermSet;
use crate::{LocaliserError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Rejected,
    /// Accepted on a game-term or sentence-pattern signal alone.
    Weak,
    /// Script ratio met.
    Strong,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    TooShort { len: usize },
    Junk { pattern: String },
    ScriptRatio { ratio: f32 },
    GameTerm { term: String },
    SentencePattern { pattern: String },
    NoSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub confidence: Confidence,
    pub reasons: Vec<Reason>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.confidence != Confidence::Rejected
    }

    fn rejected(reason: Reason) -> Self {
        Self {
            confidence: Confidence::Rejected,
            reasons: vec![reason],
        }
    }
}

/// Decides whether decoded payload text is real localisable text or a
/// byte pattern that happened to decode to printable characters.
///
/// Acceptance requires the minimum stripped length, no junk signature, and
/// at least one positive signal (script ratio, game term, sentence pattern).
#[derive(Debug, Clone)]
pub struct Classifier {
    terms: TermSet,
    game_terms_lower: Vec<String>,
    junk: Vec<Regex>,
    sentences: Vec<Regex>,
}

fn compile_all(patterns: &[String], case_insensitive: bool) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|source| LocaliserError::Pattern {
                    pattern: p.clone(),
                    source,
                })
        })
        .collect()
}

impl Classifier {
    pub fn new(terms: &TermSet) -> Result<Self> {
        Ok(Self {
            terms: terms.clone(),
            game_terms_lower: terms.game_terms.iter().map(|t| t.to_lowercase()).collect(),
            junk: compile_all(&terms.junk_patterns, true)?,
            sentences: compile_all(&terms.sentence_patterns, false)?,
        })
    }

    /// Text with whitespace, basic punctuation and line markers removed.
    pub fn stripped(&self, text: &str) -> String {
        let marker = self.terms.newline_marker;
        text.chars()
            .filter(|&c| {
                !(c.is_whitespace()
                    || c == marker
                    || matches!(c, '.' | ',' | '!' | '?' | '-' | '・' | '。' | '、'))
            })
            .collect()
    }

    /// Fraction of printable characters of `stripped` that belong to the
    /// source script. Zero when nothing printable remains.
    pub fn script_ratio(&self, stripped: &str) -> f32 {
        let mut printable = 0usize;
        let mut in_script = 0usize;
        for c in stripped.chars().filter(|c| !c.is_control()) {
            printable += 1;
            if self.terms.in_script(c) {
                in_script += 1;
            }
        }
        if printable == 0 {
            return 0.0;
        }
        in_script as f32 / printable as f32
    }

    pub fn find_game_term(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.game_terms_lower
            .iter()
            .position(|t| !t.is_empty() && lower.contains(t.as_str()))
            .map(|i| self.terms.game_terms[i].as_str())
    }

    pub fn find_junk(&self, text: &str) -> Option<&str> {
        self.junk
            .iter()
            .find(|re| re.is_match(text))
            .map(|re| re.as_str())
    }

    pub fn find_sentence_pattern(&self, text: &str) -> Option<&str> {
        self.sentences
            .iter()
            .find(|re| re.is_match(text))
            .map(|re| re.as_str())
    }

    pub fn classify(&self, text: &str) -> Verdict {
        let stripped = self.stripped(text);
        let len = stripped.chars().count();
        if len < self.terms.min_stripped_len {
            return Verdict::rejected(Reason::TooShort { len });
        }

        if let Some(pattern) = self.find_junk(text) {
            return Verdict::rejected(Reason::Junk {
                pattern: pattern.to_string(),
            });
        }

        let mut reasons = Vec::new();
        let mut confidence = Confidence::Rejected;

        let ratio = self.script_ratio(&stripped);
        if ratio >= self.terms.min_script_ratio {
            confidence = Confidence::Strong;
            reasons.push(Reason::ScriptRatio { ratio });
        }
        if let Some(term) = self.find_game_term(text) {
            confidence = confidence.max(Confidence::Weak);
            reasons.push(Reason::GameTerm {
                term: term.to_string(),
            });
        }
        if let Some(pattern) = self.find_sentence_pattern(text) {
            confidence = confidence.max(Confidence::Weak);
            reasons.push(Reason::SentencePattern {
                pattern: pattern.to_string(),
            });
        }

        if reasons.is_empty() {
            reasons.push(Reason::NoSignal);
        }

        Verdict { confidence, reasons }
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.classify(text).is_valid()
    }

    /// Set `is_valid` on every segment from its clean text (falling back to
    /// the raw text for segments that were never normalised). Returns the
    /// number of valid segments.
    pub fn classify_segments(&self, segments: &mut [Segment]) -> usize {
        let mut valid = 0usize;
        for seg in segments.iter_mut() {
            let text = if seg.clean_text.is_empty() {
                seg.raw_text.as_str()
            } else {
                seg.clean_text.as_str()
            };
            let verdict = self.classify(text);
            seg.is_valid = verdict.is_valid();
            if seg.is_valid {
                valid += 1;
                log::debug!("[{}] VALID {:?}: {:?}", seg.index, verdict.confidence, text);
            } else {
                log::trace!("[{}] rejected {:?}", seg.index, verdict.reasons);
            }
        }
        valid
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::segment::NEWLINE_MARKER;
use crate::Result;

/// Domain vocabulary handed to the classifier and normalizer.
///
/// Everything title-specific lives here so that another game can be
/// handled by loading a different JSON file. Missing fields fall back to
/// the defaults for the card-game title the tool was first written for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermSet {
    /// Case-insensitive substrings that mark in-domain text.
    pub game_terms: Vec<String>,
    /// Regular expressions (matched case-insensitively) that flag paths,
    /// boilerplate and binary noise.
    pub junk_patterns: Vec<String>,
    /// Regular expressions for sentence endings and other phrasing typical
    /// of the source language.
    pub sentence_patterns: Vec<String>,
    /// Inclusive code point ranges of the source script.
    pub script_ranges: Vec<[u32; 2]>,
    pub min_script_ratio: f32,
    pub min_stripped_len: usize,
    pub newline_marker: char,
}

impl Default for TermSet {
    fn default() -> Self {
        let game_terms = [
            "ヴァンガード", "vanguard", "ガード", "guard",
            "アタック", "attack", "ダメージ", "damage",
            "ブースト", "boost", "パワー", "power",
            "リアガード", "rear", "ドライブ", "drive",
            "チェック", "check", "トリガー", "trigger",
            "ユニット", "unit", "カード", "card",
            "バトル", "battle", "ターン", "turn",
            "フィールド", "field", "ステップ", "step",
        ];

        let junk_patterns = [
            r"^[a-z]:[/\\]",
            r"/[a-z0-9_]+/",
            r"\.(?:dll|exe|bin|rtz|orb)$",
            r"^[0-9a-f]{8,}$",
            r"^copyright.*all rights reserved",
            r"楲瑰|潴た|畴潴|瑥畴",
            r"^[^\x{3040}-\x{9FAF}\x{FF00}-\x{FFEF}\w\s]{5,}",
        ];

        let sentence_patterns = [
            r"[。！？]",
            r"だよ|です|である|だね|でしょ|わ。|の。|よ。",
            r"これ|それ|あれ|この|その|あの",
            r"ます|だ",
            r"って|という|といった",
        ];

        Self {
            game_terms: game_terms.iter().map(|s| s.to_string()).collect(),
            junk_patterns: junk_patterns.iter().map(|s| s.to_string()).collect(),
            sentence_patterns: sentence_patterns.iter().map(|s| s.to_string()).collect(),
            script_ranges: vec![
                // Hiragana and Katakana
                [0x3040, 0x30FF],
                // CJK Unified Ideographs
                [0x4E00, 0x9FAF],
                // Halfwidth and Fullwidth Forms
                [0xFF00, 0xFFEF],
            ],
            min_script_ratio: 0.30,
            min_stripped_len: 3,
            newline_marker: NEWLINE_MARKER,
        }
    }
}

impl TermSet {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let terms: TermSet = serde_json::from_str(&data)?;
        log::info!(
            "loaded term set from {} ({} game terms, {} junk patterns)",
            path.display(),
            terms.game_terms.len(),
            terms.junk_patterns.len()
        );
        Ok(terms)
    }

    /// Add game terms, skipping any already present (case-insensitive).
    pub fn merge_terms<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for term in extra {
            let term = term.into();
            let lower = term.to_lowercase();
            if !self.game_terms.iter().any(|t| t.to_lowercase() == lower) {
                self.game_terms.push(term);
            }
        }
    }

    pub fn in_script(&self, c: char) -> bool {
        let cp = c as u32;
        self.script_ranges
            .iter()
            .any(|[lo, hi]| (*lo..=*hi).contains(&cp))
    }
}

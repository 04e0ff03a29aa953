// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rewrites gendered word forms to match the relaying account.

use std::collections::HashMap;

use regex::{Captures, Regex};

use chorus_config::model::GenderConfig;
use chorus_core::{ChorusError, Content, Gender};

/// One direction of rewriting: a whole-word matcher plus its replacements.
struct Direction {
    pattern: Regex,
    replacements: HashMap<String, String>,
}

impl Direction {
    fn build(pairs: impl Iterator<Item = (String, String)>) -> Result<Option<Self>, ChorusError> {
        let replacements: HashMap<String, String> = pairs
            .filter(|(from, to)| !from.is_empty() && from != to)
            .map(|(from, to)| (from.to_lowercase(), to))
            .collect();
        if replacements.is_empty() {
            return Ok(None);
        }

        // Longest first so a word never loses to one of its prefixes.
        let mut words: Vec<&String> = replacements.keys().collect();
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .map_err(|e| ChorusError::Config(format!("invalid gender word list: {e}")))?;
        Ok(Some(Self {
            pattern,
            replacements,
        }))
    }

    fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let found = &caps[0];
                match self.replacements.get(&found.to_lowercase()) {
                    Some(replacement) => match_case(found, replacement),
                    None => found.to_string(),
                }
            })
            .into_owned()
    }
}

/// Copies the capitalisation style of `original` onto `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_lowercase()
}

/// Adapts message text to the grammatical gender of an account.
pub struct GenderAdapter {
    to_male: Option<Direction>,
    to_female: Option<Direction>,
}

impl GenderAdapter {
    pub fn new(config: &GenderConfig) -> Result<Self, ChorusError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let pairs = || {
            config
                .pairs
                .iter()
                .map(|[masculine, feminine]| (masculine.clone(), feminine.clone()))
        };
        Ok(Self {
            to_male: Direction::build(pairs().map(|(m, f)| (f, m)))?,
            to_female: Direction::build(pairs())?,
        })
    }

    pub fn disabled() -> Self {
        Self {
            to_male: None,
            to_female: None,
        }
    }

    pub fn adapt_text(&self, text: &str, gender: Gender) -> String {
        let direction = match gender {
            Gender::Male => self.to_male.as_ref(),
            Gender::Female => self.to_female.as_ref(),
            Gender::Unspecified => None,
        };
        match direction {
            Some(direction) => direction.apply(text),
            None => text.to_string(),
        }
    }

    /// Adapts the text or caption of `content`.
    pub fn adapt(&self, content: &Content, gender: Gender) -> Content {
        content.map_text(|text| self.adapt_text(text, gender))
    }
}

//! Language detection for the three supported locales.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use whatlang::{Detector, Lang};

use super::rules::RuleTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Uz,
    Ru,
    En,
}

impl Language {
    /// Keyword scoring order; earlier entries win ties.
    pub const ALL: [Language; 3] = [Language::Uz, Language::Ru, Language::En];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Uz => "uz",
            Language::Ru => "ru",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uz" => Ok(Language::Uz),
            "ru" => Ok(Language::Ru),
            "en" => Ok(Language::En),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

static CYRILLIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[а-яА-ЯёЁ]").unwrap());
static LATIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]").unwrap());

pub struct LanguageDetector {
    tables: Arc<RuleTables>,
    statistical: Option<Detector>,
}

impl LanguageDetector {
    pub fn new(tables: Arc<RuleTables>, statistical: bool) -> Self {
        let statistical =
            statistical.then(|| Detector::with_allowlist(vec![Lang::Uzb, Lang::Rus, Lang::Eng]));
        Self {
            tables,
            statistical,
        }
    }

    /// A reliable statistical guess wins unless the keyword tables point at a
    /// different language; then the keywords decide. With no keyword hits the
    /// script decides.
    pub fn detect(&self, text: &str) -> Language {
        if text.trim().chars().count() < 3 {
            return Language::Uz;
        }

        let keywords = self.by_keywords(text);
        if let Some(language) = self.detect_statistically(text) {
            match keywords {
                Some((other, _)) if other != language => {
                    debug!("Statistical guess '{}' overruled by keywords ('{}')", language, other);
                }
                _ => {
                    debug!("Statistical detection picked '{}'", language);
                    return language;
                }
            }
        }

        match keywords {
            Some((language, score)) => {
                debug!("Keyword detection picked '{}' (score {})", language, score);
                language
            }
            None => by_script(text),
        }
    }

    /// Highest keyword score, if any keyword matched at all.
    fn by_keywords(&self, text: &str) -> Option<(Language, usize)> {
        let lower = text.to_lowercase();
        let mut best: Option<(Language, usize)> = None;
        for language in Language::ALL {
            let score = self
                .tables
                .rules(language)
                .detection_keywords
                .iter()
                .filter(|kw| lower.contains(kw.as_str()))
                .count();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((language, score));
            }
        }
        best.filter(|(_, score)| *score > 0)
    }

    fn detect_statistically(&self, text: &str) -> Option<Language> {
        let info = self.statistical.as_ref()?.detect(text)?;
        if !info.is_reliable() {
            return None;
        }
        match info.lang() {
            Lang::Uzb => Some(Language::Uz),
            Lang::Rus => Some(Language::Ru),
            Lang::Eng => Some(Language::En),
            _ => None,
        }
    }
}

fn by_script(text: &str) -> Language {
    if CYRILLIC.is_match(text) {
        Language::Ru
    } else if LATIN.is_match(text) {
        Language::En
    } else {
        Language::Uz
    }
}

//! Intent classification by ordered keyword lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::language::Language;
use super::rules::RuleTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Create,
    Update,
    Delete,
    Show,
    Remind,
    Cancel,
    /// Labels this build does not know, e.g. from an older snapshot.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Intent::Create => "CREATE",
            Intent::Update => "UPDATE",
            Intent::Delete => "DELETE",
            Intent::Show => "SHOW",
            Intent::Remind => "REMIND",
            Intent::Cancel => "CANCEL",
            Intent::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Expects `text` already lower-cased.
pub fn classify(tables: &RuleTables, text: &str, language: Language) -> Intent {
    let rules = tables.rules(language);
    for (intent, keywords) in &rules.intents {
        if keywords.iter().any(|kw| text.contains(kw.as_str())) {
            return *intent;
        }
    }

    if text.contains('?') {
        Intent::Show
    } else if tables
        .remind_markers
        .iter()
        .any(|marker| text.contains(marker.as_str()))
    {
        Intent::Remind
    } else {
        Intent::Create
    }
}

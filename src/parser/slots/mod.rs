//! Slot extraction: independent, pure extractors over `(text, language, reference time)`.
//!
//! None of the extractors fail. When a slot cannot be filled the extractor
//! returns its documented default and the suggestion generator asks the user
//! for the missing piece.

pub mod fields;
pub mod time_extractor;
pub mod title;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::language::Language;
use super::rules::RuleTables;

/// Where the start time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSource {
    /// A relative-day or weekday keyword.
    Keyword,
    /// A date or clock time found elsewhere in the text.
    Parsed,
    /// Nothing usable; the next free hour.
    #[default]
    Default,
}

/// Whether the title was taken from the prompt or filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleSource {
    Text,
    #[default]
    Default,
}

/// Reference point for every time computation of one request.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

impl ExtractionContext {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self { now, timezone }
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.timezone)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub title: String,
    pub all_day: bool,
    pub time_start: DateTime<FixedOffset>,
    pub time_end: DateTime<FixedOffset>,
    pub repeat: Option<String>,
    pub invite: Vec<String>,
    pub alert: Vec<String>,
    pub url: Option<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub time_source: TimeSource,
    #[serde(default)]
    pub title_source: TitleSource,
}

/// Runs every extractor over one prompt.
pub fn extract(
    tables: &RuleTables,
    text: &str,
    language: Language,
    ctx: &ExtractionContext,
) -> ExtractedFields {
    let range = time_extractor::extract_time_range(tables, text, language, ctx);
    let (title, title_source) = title::extract_title(tables, text, language);
    ExtractedFields {
        title,
        all_day: fields::extract_all_day(tables, text, language),
        time_start: range.start,
        time_end: range.end,
        repeat: fields::extract_recurrence(tables, text, language),
        invite: fields::extract_invitees(tables, text),
        alert: fields::extract_alerts(tables, text, language),
        url: fields::extract_url(tables, text),
        note: fields::extract_note(text),
        time_source: range.source,
        title_source,
    }
}

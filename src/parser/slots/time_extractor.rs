//! Time range extraction.
//!
//! Resolution order: a relative-day or weekday keyword (with an optional clock
//! time overlaid), then a loose date/time parse of the whole prompt, then the
//! next hour. Every result is localized to the caller's timezone and lasts one
//! hour.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use chrono_tz::Tz;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ExtractionContext, TimeSource};
use crate::parser::language::Language;
use crate::parser::rules::{DayRef, Meridiem, RuleTables};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub source: TimeSource,
}

impl TimeRange {
    fn one_hour(start: DateTime<FixedOffset>, source: TimeSource) -> Self {
        Self {
            start,
            end: start + Duration::hours(1),
            source,
        }
    }
}

pub fn extract_time_range(
    tables: &RuleTables,
    text: &str,
    language: Language,
    ctx: &ExtractionContext,
) -> TimeRange {
    let lower = text.to_lowercase();
    let local_now = ctx.local_now();
    let today = local_now.date_naive();

    let keyword = tables
        .rules(language)
        .day_keywords
        .iter()
        .find(|(keyword, _)| lower.contains(keyword.as_str()));
    if let Some((keyword, day)) = keyword {
        let date = resolve_day(*day, today);
        let time = extract_clock(tables, &lower)
            .and_then(|(hour, minute)| NaiveTime::from_hms_opt(hour, minute, 0))
            .unwrap_or_else(|| local_now.time());
        debug!("Day keyword '{}' resolved to {} {}", keyword, date, time);
        let start = localize(date.and_time(time), ctx.timezone);
        return TimeRange::one_hour(start, TimeSource::Keyword);
    }

    if let Some(naive) = loose_parse(tables, &lower, language, today) {
        debug!("Loose parse found {}", naive);
        return TimeRange::one_hour(localize(naive, ctx.timezone), TimeSource::Parsed);
    }

    let start = (ctx.now + Duration::hours(1))
        .with_timezone(&ctx.timezone)
        .fixed_offset();
    TimeRange::one_hour(start, TimeSource::Default)
}

fn resolve_day(day: DayRef, today: NaiveDate) -> NaiveDate {
    match day {
        DayRef::Offset(days) => today + Duration::days(days),
        DayRef::Next(weekday) => {
            let mut days_ahead = i64::from(weekday.num_days_from_monday())
                - i64::from(today.weekday().num_days_from_monday());
            if days_ahead <= 0 {
                days_ahead += 7;
            }
            today + Duration::days(days_ahead)
        }
    }
}

/// First clock time in `lower`, as 24-hour `(hour, minute)`.
pub fn extract_clock(tables: &RuleTables, lower: &str) -> Option<(u32, u32)> {
    for rule in &tables.clock {
        let Some(caps) = rule.pattern.captures(lower) else {
            continue;
        };
        let Ok(mut hour) = caps[1].parse::<u32>() else {
            continue;
        };
        let minute = match caps.get(2) {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(minute) => minute,
                Err(_) => continue,
            },
            None => 0,
        };

        match rule.meridiem {
            Meridiem::Pm if hour < 12 => hour += 12,
            Meridiem::Am if hour == 12 => hour = 0,
            _ => {}
        }

        if hour < 24 && minute < 60 {
            return Some((hour, minute));
        }
    }
    None
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static DOTTED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").unwrap());
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static DAY_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?:-|\s+)([^\W\d_]+)").unwrap());
static MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\W\d_]+)\s+(\d{1,2})\b").unwrap());

/// Dates and clock times anywhere in the prompt. A date without a time means
/// midnight; a time without a date means today. Bare numbers are not dates.
fn loose_parse(
    tables: &RuleTables,
    lower: &str,
    language: Language,
    today: NaiveDate,
) -> Option<NaiveDateTime> {
    match find_date(tables, lower, language, today) {
        Some((date, start, end)) => {
            let rest = format!("{} {}", &lower[..start], &lower[end..]);
            let (hour, minute) = extract_clock(tables, &rest).unwrap_or((0, 0));
            date.and_hms_opt(hour, minute, 0)
        }
        None => {
            let (hour, minute) = extract_clock(tables, lower)?;
            today.and_hms_opt(hour, minute, 0)
        }
    }
}

/// The first recognizable date and the byte span it occupies.
fn find_date(
    tables: &RuleTables,
    lower: &str,
    language: Language,
    today: NaiveDate,
) -> Option<(NaiveDate, usize, usize)> {
    if let Some(caps) = ISO_DATE.captures(lower) {
        let span = caps.get(0)?;
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some((date, span.start(), span.end()));
        }
    }

    if let Some(caps) = DOTTED_DATE.captures(lower) {
        let span = caps.get(0)?;
        if let Some(date) = ymd(&caps[3], &caps[2], &caps[1]) {
            return Some((date, span.start(), span.end()));
        }
    }

    let rules = tables.rules(language);
    if let Some(caps) = SLASH_DATE.captures(lower) {
        let span = caps.get(0)?;
        let date = if rules.month_first_slash_dates {
            ymd(&caps[3], &caps[1], &caps[2])
        } else {
            ymd(&caps[3], &caps[2], &caps[1])
        };
        if let Some(date) = date {
            return Some((date, span.start(), span.end()));
        }
    }

    let month_of = |word: &str| {
        rules
            .month_names
            .iter()
            .find(|(name, _)| name == word)
            .map(|(_, month)| *month)
    };

    for caps in DAY_MONTH.captures_iter(lower) {
        let Some(month) = month_of(&caps[2]) else {
            continue;
        };
        let span = caps.get(0)?;
        if let Some(date) = caps[1]
            .parse()
            .ok()
            .and_then(|day| NaiveDate::from_ymd_opt(today.year(), month, day))
        {
            return Some((date, span.start(), span.end()));
        }
    }

    for caps in MONTH_DAY.captures_iter(lower) {
        let Some(month) = month_of(&caps[1]) else {
            continue;
        };
        let span = caps.get(0)?;
        if let Some(date) = caps[2]
            .parse()
            .ok()
            .and_then(|day| NaiveDate::from_ymd_opt(today.year(), month, day))
        {
            return Some((date, span.start(), span.end()));
        }
    }

    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Attach `tz` to a wall-clock time. Ambiguous times take the earlier
/// instant; times skipped by a DST jump are read as UTC.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .fixed_offset()
}

/// Accepts RFC 3339, a naive `YYYY-MM-DD[T ]HH:MM[:SS[.f]]` read in `tz`,
/// or a bare date meaning midnight in `tz`.
pub fn parse_timestamp(value: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at);
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(localize(naive, tz));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| localize(date.and_time(NaiveTime::MIN), tz))
}

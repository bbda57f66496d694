//! Confidence scoring and follow-up suggestions.

use chrono::Duration;

use super::language::Language;
use super::rules::RuleTables;
use super::slots::{ExtractedFields, TimeSource, TitleSource};

const BASE: f64 = 0.5;
const TITLE_WEIGHT: f64 = 0.2;
const TIME_WEIGHT: f64 = 0.2;
const OPTIONAL_WEIGHT: f64 = 0.05;
const CEILING: f64 = 0.95;
const MAX_SUGGESTIONS: usize = 3;

/// Always within `[0.5, 0.95]`.
pub fn score(tables: &RuleTables, fields: &ExtractedFields) -> f64 {
    let mut confidence = BASE;
    if fields.title_source == TitleSource::Text {
        confidence += TITLE_WEIGHT;
    }
    if fields.time_source != TimeSource::Default {
        confidence += TIME_WEIGHT;
    }

    let optional = [
        fields.repeat.is_some(),
        !fields.invite.is_empty(),
        !fields.alert.is_empty(),
        fields.url.is_some(),
        fields.note.is_some(),
    ];
    confidence += OPTIONAL_WEIGHT * optional.iter().filter(|present| **present).count() as f64;

    // Round away float noise so 0.5 + 0.2 + 0.2 + 0.05 compares equal to 0.95.
    ((confidence.min(CEILING)) * 100.0).round() / 100.0
}

pub fn suggest(tables: &RuleTables, fields: &ExtractedFields, language: Language) -> Vec<String> {
    let texts = &tables.rules(language).suggestions;
    let mut suggestions = Vec::new();

    if fields.time_source == TimeSource::Default {
        suggestions.push(texts.time_missing.clone());
    }

    let duration = fields.time_end - fields.time_start;
    if duration < Duration::minutes(15) {
        suggestions.push(texts.short_duration.clone());
    } else if duration > Duration::days(7) {
        suggestions.push(texts.long_duration.clone());
    }

    if fields.alert.is_empty() {
        suggestions.push(texts.add_alert.clone());
    }
    if fields.repeat.is_none() {
        suggestions.push(texts.add_repeat.clone());
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2025-01-09T14:30:00+05:00").unwrap()
    }

    fn bare() -> ExtractedFields {
        ExtractedFields {
            title: "Event".to_string(),
            all_day: false,
            time_start: start(),
            time_end: start() + Duration::hours(1),
            repeat: None,
            invite: Vec::new(),
            alert: Vec::new(),
            url: None,
            note: None,
            time_source: TimeSource::Default,
            title_source: TitleSource::Default,
        }
    }

    #[test]
    fn confidence_grows_with_each_field_and_stays_bounded() {
        let tables = RuleTables::builtin();
        let mut fields = bare();
        let mut previous = score(&tables, &fields);
        assert_eq!(previous, 0.5);

        let steps: Vec<Box<dyn Fn(&mut ExtractedFields)>> = vec![
            Box::new(|f: &mut ExtractedFields| {
                f.title = "Standup".to_string();
                f.title_source = TitleSource::Text;
            }),
            Box::new(|f: &mut ExtractedFields| f.time_source = TimeSource::Keyword),
            Box::new(|f: &mut ExtractedFields| f.note = Some("standup".to_string())),
            Box::new(|f: &mut ExtractedFields| f.repeat = Some("RRULE:FREQ=DAILY".to_string())),
            Box::new(|f: &mut ExtractedFields| f.invite = vec!["a@example.com".to_string()]),
            Box::new(|f: &mut ExtractedFields| f.alert = vec!["10m".to_string()]),
            Box::new(|f: &mut ExtractedFields| f.url = Some("https://example.com".to_string())),
        ];
        for step in steps {
            step(&mut fields);
            let next = score(&tables, &fields);
            assert!(next >= previous);
            assert!((0.5..=0.95).contains(&next));
            previous = next;
        }
        assert_eq!(previous, 0.95);
    }

    #[test]
    fn only_titles_taken_from_the_prompt_count() {
        let tables = RuleTables::builtin();
        let mut fields = bare();
        fields.title = "Uchrashuv".to_string();
        assert_eq!(score(&tables, &fields), 0.5);

        fields.title = "Встреча".to_string();
        fields.title_source = TitleSource::Text;
        assert_eq!(score(&tables, &fields), 0.7);
    }

    #[test]
    fn missing_time_is_suggested_first() {
        let tables = RuleTables::builtin();
        let suggestions = suggest(&tables, &bare(), Language::En);
        assert_eq!(
            suggestions,
            vec![
                "Please specify time (e.g., 'tomorrow 14:00', 'on Friday')",
                "Do you want to add an alert?",
                "Do you want to add repetition?",
            ]
        );
    }

    #[test]
    fn duration_hints() {
        let tables = RuleTables::builtin();
        let mut fields = bare();
        fields.time_source = TimeSource::Parsed;
        fields.alert = vec!["5m".to_string()];
        fields.repeat = Some("RRULE:FREQ=DAILY".to_string());

        fields.time_end = fields.time_start + Duration::minutes(10);
        assert_eq!(
            suggest(&tables, &fields, Language::Ru),
            vec!["Это очень короткое время, хотите увеличить продолжительность?"]
        );

        fields.time_end = fields.time_start + Duration::days(8);
        assert_eq!(
            suggest(&tables, &fields, Language::Uz),
            vec!["Bu vaqt juda uzoq, davomiylikni qisqartirishni xohlaysizmi?"]
        );
    }

    #[test]
    fn suggestions_are_capped() {
        let tables = RuleTables::builtin();
        let mut fields = bare();
        fields.time_end = fields.time_start;
        // time, short duration, alert and repeat all apply; only three survive.
        assert_eq!(suggest(&tables, &fields, Language::En).len(), 3);
    }
}

use chrono::{Duration, TimeZone, Timelike, Utc};
use chrono_tz::Asia::Tashkent;
use pretty_assertions::assert_eq;
use test_case::test_case;

use taqvim::parser::scoring;
use taqvim::parser::{TimeSource, TitleSource};
use taqvim::{ExtractionContext, Intent, Interpreter, Language, RuleTables};

fn interpreter() -> Interpreter {
    Interpreter::new(RuleTables::builtin(), false, 1000)
}

// Statistical detection on, as in the default configuration.
fn production_interpreter() -> Interpreter {
    Interpreter::new(RuleTables::builtin(), true, 1000)
}

// Wednesday 2025-01-08, 15:00 in Tashkent.
fn ctx() -> ExtractionContext {
    ExtractionContext::new(Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap(), Tashkent)
}

#[test]
fn uzbek_meeting_tomorrow_afternoon() {
    let result = interpreter()
        .interpret("Ertaga soat 14:30 da meeting bor", None, &ctx())
        .unwrap();
    let fields = &result.extracted_fields;

    assert_eq!(result.language, Language::Uz);
    assert_eq!(result.intent, Intent::Create);
    assert_eq!(fields.time_start.to_rfc3339(), "2025-01-09T14:30:00+05:00");
    assert_eq!(fields.time_end - fields.time_start, Duration::hours(1));
    assert!(!fields.title.contains("14:30"));
    assert!(!fields.title.to_lowercase().contains("ertaga"));
    assert!(result.confidence >= 0.7);
}

#[test]
fn english_reminder_with_invitee() {
    let result = interpreter()
        .interpret("Remind me 1 hour before meeting test@example.com", None, &ctx())
        .unwrap();

    assert_eq!(result.language, Language::En);
    assert_eq!(result.extracted_fields.invite, vec!["test@example.com"]);
    assert_eq!(result.extracted_fields.alert, vec!["1h"]);
}

#[test]
fn russian_weekday_with_clock() {
    let result = interpreter()
        .interpret("Созвон в пятницу в 10:00", None, &ctx())
        .unwrap();
    let start = result.extracted_fields.time_start.with_timezone(&Tashkent);

    assert_eq!(result.language, Language::Ru);
    assert_eq!(start.date_naive().to_string(), "2025-01-10");
    assert_eq!((start.hour(), start.minute()), (10, 0));
    assert_eq!(result.extracted_fields.time_source, TimeSource::Keyword);
}

#[test]
fn nothing_useful_degrades_to_suggestions() {
    let result = interpreter().interpret("ok", None, &ctx()).unwrap();

    assert_eq!(result.extracted_fields.time_source, TimeSource::Default);
    assert!(result.confidence < 0.7);
    assert!(!result.suggestions.is_empty());
    assert!(result.suggestions.len() <= 3);
}

#[test_case("create a meeting and delete the old one", Language::En, Intent::Create ; "english create listed first")]
#[test_case("o'chir va yangila", Language::Uz, Intent::Update ; "uzbek update listed before delete")]
#[test_case("удалить и показать", Language::Ru, Intent::Delete ; "russian delete listed before show")]
fn earliest_table_entry_wins(text: &str, language: Language, expected: Intent) {
    let result = interpreter().interpret(text, Some(language), &ctx()).unwrap();
    assert_eq!(result.intent, expected);
}

#[test_case("Ertaga soat 9 da yig'ilish" ; "uzbek")]
#[test_case("Встреча завтра в 15:00 с ivan@example.com, напомни за 30 минут, каждую неделю https://meet.example.com примечание" ; "russian busy")]
#[test_case("Lunch" ; "english bare")]
#[test_case("Team sync every day at 9am with a@example.com b@example.com remind 10 minutes before https://zoom.us/j/1" ; "english busy")]
fn confidence_stays_in_bounds(text: &str) {
    let result = interpreter().interpret(text, None, &ctx()).unwrap();
    assert!(
        (0.5..=0.95).contains(&result.confidence),
        "confidence {} out of range for {:?}",
        result.confidence,
        text
    );
}

#[test]
fn confidence_never_drops_as_fields_are_added() {
    let tables = RuleTables::builtin();
    let mut fields = interpreter()
        .interpret("Planning session tomorrow at 11:00", None, &ctx())
        .unwrap()
        .extracted_fields;
    let mut previous = scoring::score(&tables, &fields);

    fields.repeat = Some("weekly".to_string());
    let next = scoring::score(&tables, &fields);
    assert!(next >= previous);
    previous = next;

    fields.invite = vec!["a@example.com".to_string()];
    let next = scoring::score(&tables, &fields);
    assert!(next >= previous);
    previous = next;

    fields.alert = vec!["15m".to_string()];
    fields.url = Some("https://example.com".to_string());
    fields.note = Some("agenda".to_string());
    let next = scoring::score(&tables, &fields);
    assert!(next >= previous);
    assert!(next <= 0.95);
}

#[test]
fn scenarios_hold_with_statistical_detection() {
    let uz = production_interpreter()
        .interpret("Ertaga soat 14:30 da meeting bor", None, &ctx())
        .unwrap();
    assert_eq!(uz.language, Language::Uz);
    assert_eq!(uz.extracted_fields.time_start.to_rfc3339(), "2025-01-09T14:30:00+05:00");
    assert!(uz.confidence >= 0.7);

    let en = production_interpreter()
        .interpret("Remind me 1 hour before meeting test@example.com", None, &ctx())
        .unwrap();
    assert_eq!(en.language, Language::En);
    assert_eq!(en.extracted_fields.invite, vec!["test@example.com"]);
    assert_eq!(en.extracted_fields.alert, vec!["1h"]);

    let ru = production_interpreter()
        .interpret("Созвон в пятницу в 10:00", None, &ctx())
        .unwrap();
    let start = ru.extracted_fields.time_start.with_timezone(&Tashkent);
    assert_eq!(ru.language, Language::Ru);
    assert_eq!(start.date_naive().to_string(), "2025-01-10");
    assert_eq!((start.hour(), start.minute()), (10, 0));
}

#[test]
fn a_typed_title_counts_even_when_it_matches_a_default() {
    let ru = production_interpreter()
        .interpret("Встреча завтра в 15:00", None, &ctx())
        .unwrap();
    let uz = production_interpreter()
        .interpret("Uchrashuv ertaga soat 15:00 da", None, &ctx())
        .unwrap();

    assert_eq!(ru.extracted_fields.title, "Встреча");
    assert_eq!(ru.extracted_fields.title_source, TitleSource::Text);
    assert_eq!(ru.confidence, uz.confidence);
    assert!(ru.confidence >= 0.9);
}

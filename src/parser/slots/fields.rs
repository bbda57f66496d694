//! The small extractors: all-day flag, recurrence, invitees, alerts, URL and note.

use crate::parser::language::Language;
use crate::parser::rules::RuleTables;

const MAX_ALERTS: usize = 3;
const NOTE_LIMIT: usize = 500;
const NOTE_KEEP: usize = 497;

pub fn extract_all_day(tables: &RuleTables, text: &str, language: Language) -> bool {
    let lower = text.to_lowercase();
    tables
        .rules(language)
        .all_day
        .iter()
        .any(|phrase| lower.contains(phrase.as_str()))
}

/// RRULE string for the first recurrence phrase found.
pub fn extract_recurrence(tables: &RuleTables, text: &str, language: Language) -> Option<String> {
    let lower = text.to_lowercase();
    tables
        .rules(language)
        .recurrence
        .iter()
        .find(|(phrase, _)| lower.contains(phrase.as_str()))
        .map(|(_, rule)| rule.clone())
}

/// Email-looking substrings in order of appearance, duplicates kept.
pub fn extract_invitees(tables: &RuleTables, text: &str) -> Vec<String> {
    tables
        .email
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `<integer><unit>` labels, scanning patterns in table order.
pub fn extract_alerts(tables: &RuleTables, text: &str, language: Language) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut alerts = Vec::new();
    for rule in &tables.rules(language).alerts {
        for caps in rule.pattern.captures_iter(&lower) {
            alerts.push(format!("{}{}", &caps[1], rule.unit.letter()));
        }
    }
    alerts.truncate(MAX_ALERTS);
    alerts
}

pub fn extract_url(tables: &RuleTables, text: &str) -> Option<String> {
    tables.url.find(text).map(|m| m.as_str().to_string())
}

pub fn extract_note(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > NOTE_LIMIT {
        let kept: String = text.chars().take(NOTE_KEEP).collect();
        return Some(format!("{}...", kept));
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn tables() -> std::sync::Arc<RuleTables> {
        RuleTables::builtin()
    }

    #[test_case("Conference all day", Language::En, true)]
    #[test_case("Bayram butun kun", Language::Uz, true)]
    #[test_case("Семинар на весь день", Language::Ru, true)]
    #[test_case("Lunch at noon", Language::En, false)]
    fn all_day_phrases(text: &str, language: Language, expected: bool) {
        assert_eq!(extract_all_day(&tables(), text, language), expected);
    }

    #[test_case("Gym every day at 7", Language::En, Some("RRULE:FREQ=DAILY"))]
    #[test_case("1:1 bi-weekly on monday", Language::En, Some("RRULE:FREQ=WEEKLY;INTERVAL=2"))]
    #[test_case("Retro every friday", Language::En, Some("RRULE:FREQ=WEEKLY;BYDAY=FR"))]
    #[test_case("Yoga har juma", Language::Uz, Some("RRULE:FREQ=WEEKLY;BYDAY=FR"))]
    #[test_case("Планёрка еженедельно", Language::Ru, Some("RRULE:FREQ=WEEKLY"))]
    #[test_case("Отчёт каждый год", Language::Ru, Some("RRULE:FREQ=YEARLY"))]
    #[test_case("Dinner tomorrow", Language::En, None)]
    fn recurrence_table(text: &str, language: Language, expected: Option<&str>) {
        assert_eq!(
            extract_recurrence(&tables(), text, language),
            expected.map(str::to_string)
        );
    }

    #[test]
    fn invitees_keep_order_and_duplicates() {
        let text = "Sync with a.b@example.com, ops-team@corp.uz and a.b@example.com";
        assert_eq!(
            extract_invitees(&tables(), text),
            vec!["a.b@example.com", "ops-team@corp.uz", "a.b@example.com"]
        );
    }

    #[test_case("Remind me 1 hour before meeting", Language::En, &["1h"])]
    #[test_case("Call 30 minutes before and 2 days before", Language::En, &["30m", "2d"])]
    #[test_case("Uchrashuv 15 daqiqa oldin eslatma", Language::Uz, &["15m"])]
    #[test_case("Встреча, напомни за 10 минут до начала", Language::Ru, &["10m"])]
    #[test_case("напоминание 5 минут", Language::Ru, &["5m"])]
    #[test_case("remind 20 minutes", Language::En, &["20m"])]
    fn alert_patterns(text: &str, language: Language, expected: &[&str]) {
        assert_eq!(extract_alerts(&tables(), text, language), expected);
    }

    #[test]
    fn alerts_are_capped_at_three() {
        let text = "5 minutes before, 10 minutes before, 1 hour before, 1 day before";
        assert_eq!(
            extract_alerts(&tables(), text, Language::En),
            vec!["5m", "10m", "1h"]
        );
    }

    #[test]
    fn first_url_wins() {
        let text = "Agenda https://docs.example.com/a then http://b.example.org";
        assert_eq!(
            extract_url(&tables(), text),
            Some("https://docs.example.com/a".to_string())
        );
        assert_eq!(extract_url(&tables(), "no links here"), None);
    }

    #[test]
    fn long_notes_are_truncated() {
        let long = "x".repeat(501);
        let note = extract_note(&long).unwrap();
        assert_eq!(note.chars().count(), 500);
        assert!(note.ends_with("..."));

        let exact = "y".repeat(500);
        assert_eq!(extract_note(&exact), Some(exact.clone()));
    }
}

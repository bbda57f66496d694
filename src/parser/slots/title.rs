use crate::parser::language::Language;
use crate::parser::rules::RuleTables;

use super::TitleSource;

const MAX_TITLE_WORDS: usize = 5;

/// Whatever is left of the prompt once dates, times, contacts and links are gone.
pub fn extract_title(tables: &RuleTables, text: &str, language: Language) -> (String, TitleSource) {
    let mut cleaned = text.trim().to_string();
    for pattern in &tables.title_strip {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }

    let rules = tables.rules(language);
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|word| {
            let lower = word.to_lowercase();
            !rules.stop_words.iter().any(|stop| *stop == lower)
        })
        .take(MAX_TITLE_WORDS)
        .collect();

    if words.is_empty() {
        return ("Event".to_string(), TitleSource::Default);
    }

    let title = words.join(" ");
    if title.chars().count() < 3 {
        return (rules.default_title.clone(), TitleSource::Default);
    }
    (title, TitleSource::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn title(text: &str, language: Language) -> String {
        extract_title(&RuleTables::builtin(), text, language).0
    }

    #[test_case("Ertaga soat 14:30 da meeting bor", Language::Uz, "soat meeting bor")]
    #[test_case("Remind me 1 hour before meeting test@example.com", Language::En, "Remind me before meeting")]
    #[test_case("Совещание в пятницу в 10:00", Language::Ru, "Совещание")]
    #[test_case("Встреча с клиентом в среду", Language::Ru, "Встреча клиентом")]
    #[test_case("Sync with @dilnoza at https://meet.example.com/abc", Language::En, "Sync")]
    fn strips_time_contacts_and_stop_words(text: &str, language: Language, expected: &str) {
        assert_eq!(title(text, language), expected);
    }

    #[test]
    fn keeps_at_most_five_words() {
        assert_eq!(
            title("quarterly planning review budget roadmap hiring retro", Language::En),
            "quarterly planning review budget roadmap"
        );
    }

    #[test]
    fn empty_remainder_becomes_event() {
        assert_eq!(title("tomorrow 10:00", Language::En), "Event");
        assert_eq!(title("ertaga da", Language::Uz), "Event");
    }

    #[test]
    fn a_typed_word_matching_a_default_is_still_text() {
        let tables = RuleTables::builtin();
        let (title, source) = extract_title(&tables, "Встреча завтра в 15:00", Language::Ru);
        assert_eq!(title, "Встреча");
        assert_eq!(source, TitleSource::Text);

        let (_, source) = extract_title(&tables, "tomorrow 10:00", Language::En);
        assert_eq!(source, TitleSource::Default);
    }

    #[test_case(Language::En, "Meeting")]
    #[test_case(Language::Uz, "Uchrashuv")]
    #[test_case(Language::Ru, "Встреча")]
    fn short_remainder_uses_language_default(language: Language, expected: &str) {
        assert_eq!(title("friday 9:00 xy", language), expected);
    }
}

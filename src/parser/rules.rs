//! Per-language rule tables consumed by the interpreter.
//!
//! Tables are plain data: built once, shared behind an `Arc`, never mutated
//! while requests are being served. Every list whose order matters is a `Vec`
//! and is scanned front to back, first match wins.

use chrono::Weekday;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use super::intent::Intent;
use super::language::Language;
use crate::models::AlertUnit;

/// A day reference resolved against the caller's "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    /// Whole days relative to today (tomorrow = 1, yesterday = -1).
    Offset(i64),
    /// Next occurrence of a weekday, never today.
    Next(Weekday),
}

/// How a captured hour is converted to 24-hour time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    None,
    Am,
    Pm,
}

#[derive(Debug, Clone)]
pub struct ClockRule {
    pub pattern: Regex,
    pub meridiem: Meridiem,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub pattern: Regex,
    pub unit: AlertUnit,
}

impl AlertRule {
    pub fn new(pattern: &str, unit: AlertUnit) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            unit,
        })
    }
}

/// Localized follow-up prompts.
#[derive(Debug, Clone)]
pub struct SuggestionTexts {
    pub time_missing: String,
    pub short_duration: String,
    pub long_duration: String,
    pub add_alert: String,
    pub add_repeat: String,
}

/// Labels for the actions offered with a draft preview.
#[derive(Debug, Clone)]
pub struct ActionLabels {
    pub confirm: String,
    pub edit: String,
    pub cancel: String,
}

#[derive(Debug, Clone)]
pub struct LanguageRules {
    pub detection_keywords: Vec<String>,
    pub intents: Vec<(Intent, Vec<String>)>,
    pub stop_words: Vec<String>,
    pub all_day: Vec<String>,
    pub day_keywords: Vec<(String, DayRef)>,
    pub recurrence: Vec<(String, String)>,
    pub alerts: Vec<AlertRule>,
    pub month_names: Vec<(String, u32)>,
    pub month_first_slash_dates: bool,
    pub default_title: String,
    pub suggestions: SuggestionTexts,
    pub action_labels: ActionLabels,
}

#[derive(Debug, Clone)]
pub struct RuleTables {
    languages: HashMap<Language, LanguageRules>,
    /// Language-agnostic markers that turn an unmatched prompt into a reminder.
    pub remind_markers: Vec<String>,
    /// Fragments removed from the prompt before the title is taken.
    pub title_strip: Vec<Regex>,
    /// Clock-time patterns, tried in order against the lower-cased prompt.
    pub clock: Vec<ClockRule>,
    pub email: Regex,
    pub url: Regex,
}

static BUILTIN: Lazy<Arc<RuleTables>> = Lazy::new(|| Arc::new(RuleTables::build()));

impl Default for RuleTables {
    fn default() -> Self {
        BUILTIN.as_ref().clone()
    }
}

impl RuleTables {
    /// Shared handle to the built-in tables.
    pub fn builtin() -> Arc<RuleTables> {
        Arc::clone(&BUILTIN)
    }

    pub fn rules(&self, language: Language) -> &LanguageRules {
        // Every supported language is populated in `build`; fall back to English
        // only for tables assembled by hand in tests.
        self.languages
            .get(&language)
            .or_else(|| self.languages.get(&Language::En))
            .unwrap_or_else(|| &BUILTIN.languages[&Language::En])
    }

    pub fn rules_mut(&mut self, language: Language) -> Option<&mut LanguageRules> {
        self.languages.get_mut(&language)
    }

    /// Every fallback title the interpreter may produce.
    fn build() -> Self {
        let mut languages = HashMap::new();
        languages.insert(Language::Uz, uzbek());
        languages.insert(Language::Ru, russian());
        languages.insert(Language::En, english());

        Self {
            languages,
            remind_markers: words(&["eslat", "напом", "remind"]),
            title_strip: [
                r"https?://\S+",
                r"[\w\.-]+@[\w\.-]+\.\w+",
                r"@\w+",
                r"\d{1,2}[:.]\d{2}",
                r"\d+\s*(daqiqa|soat|kun|hafta|oy|minut|hour|day|week|month)",
                r"ertaga|bugun|kecha|завтра|сегодня|вчера|tomorrow|today|yesterday",
                r"dushanba|seshanba|chorshanba|payshanba|juma|yakshanba|shanba",
                r"понедельник|вторник|среда|среду|четверг|пятница|пятницу|суббота|субботу|воскресенье",
                r"monday|tuesday|wednesday|thursday|friday|saturday|sunday",
            ]
            .iter()
            .map(|p| re(&format!("(?i){}", p)))
            .collect(),
            clock: vec![
                clock(r"(\d{1,2})[:.](\d{2})", Meridiem::None),
                clock(r"(\d{1,2})\s*soat", Meridiem::None),
                clock(r"(\d{1,2})\s*часов", Meridiem::None),
                clock(r"(\d{1,2})\s*o'clock", Meridiem::None),
                clock(r"(\d{1,2})\s*am\b", Meridiem::Am),
                clock(r"(\d{1,2})\s*pm\b", Meridiem::Pm),
                clock(r"(\d{1,2})\s*утра", Meridiem::Am),
                clock(r"(\d{1,2})\s*вечера", Meridiem::Pm),
            ],
            email: re(r"[\w\.-]+@[\w\.-]+\.\w+"),
            url: re(r"https?://\S+"),
        }
    }
}

// Only ever called while building the built-in tables.
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in rule pattern must compile")
}

fn clock(pattern: &str, meridiem: Meridiem) -> ClockRule {
    ClockRule {
        pattern: re(pattern),
        meridiem,
    }
}

fn alert(pattern: &str, unit: AlertUnit) -> AlertRule {
    AlertRule {
        pattern: re(&format!("(?i){}", pattern)),
        unit,
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn days(list: &[(&str, DayRef)]) -> Vec<(String, DayRef)> {
    list.iter().map(|(k, d)| (k.to_string(), *d)).collect()
}

fn months(list: &[(&str, u32)]) -> Vec<(String, u32)> {
    list.iter().map(|(k, m)| (k.to_string(), *m)).collect()
}

const DAILY: &str = "RRULE:FREQ=DAILY";
const WEEKLY: &str = "RRULE:FREQ=WEEKLY";
const BIWEEKLY: &str = "RRULE:FREQ=WEEKLY;INTERVAL=2";
const MONTHLY: &str = "RRULE:FREQ=MONTHLY";
const YEARLY: &str = "RRULE:FREQ=YEARLY";

fn uzbek() -> LanguageRules {
    use DayRef::*;
    LanguageRules {
        detection_keywords: words(&["va", "lekin", "yoki", "uchun", "bilan", "da", "ga", "ni", "ning"]),
        intents: vec![
            (Intent::Create, words(&["yarat", "qo'sh", "qosh", "tuz", "kirit"])),
            (Intent::Update, words(&["o'zgartir", "yangila", "tahrir", "edit"])),
            (Intent::Delete, words(&["o'chir", "delete", "uchir", "toza"])),
            (Intent::Show, words(&["ko'rsat", "korsat", "korish", "qidir"])),
            (Intent::Remind, words(&["eslat", "ogoh", "alert"])),
            (Intent::Cancel, words(&["bekor", "cancel", "otkaz"])),
        ],
        stop_words: words(&["uchun", "bilan", "da", "ga", "ni", "ning", "va", "lekin", "yoki"]),
        all_day: words(&["butun kun", "kun bo'yi", "toliq kun", "kunning hammasi"]),
        day_keywords: days(&[
            ("ertaga", Offset(1)),
            ("bugun", Offset(0)),
            ("kecha", Offset(-1)),
            ("dushanba", Next(Weekday::Mon)),
            ("seshanba", Next(Weekday::Tue)),
            ("chorshanba", Next(Weekday::Wed)),
            ("payshanba", Next(Weekday::Thu)),
            ("juma", Next(Weekday::Fri)),
            ("yakshanba", Next(Weekday::Sun)),
            ("shanba", Next(Weekday::Sat)),
        ]),
        recurrence: pairs(&[
            ("har ikki hafta", BIWEEKLY),
            ("har kun", DAILY),
            ("har hafta", WEEKLY),
            ("har oy", MONTHLY),
            ("har yil", YEARLY),
            ("har dushanba", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("har seshanba", "RRULE:FREQ=WEEKLY;BYDAY=TU"),
            ("har chorshanba", "RRULE:FREQ=WEEKLY;BYDAY=WE"),
            ("har payshanba", "RRULE:FREQ=WEEKLY;BYDAY=TH"),
            ("har juma", "RRULE:FREQ=WEEKLY;BYDAY=FR"),
            ("har yakshanba", "RRULE:FREQ=WEEKLY;BYDAY=SU"),
            ("har shanba", "RRULE:FREQ=WEEKLY;BYDAY=SA"),
            ("dushanba kunlari", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("haftasiga", WEEKLY),
            ("oyiga", MONTHLY),
            ("yiliga", YEARLY),
        ]),
        alerts: vec![
            alert(r"(\d+)\s*daqiqa\s*oldin", AlertUnit::Minutes),
            alert(r"(\d+)\s*soat\s*oldin", AlertUnit::Hours),
            alert(r"(\d+)\s*kun\s*oldin", AlertUnit::Days),
            alert(r"(\d+)\s*hafta\s*oldin", AlertUnit::Weeks),
            alert(r"(\d+)\s*m\s*oldin", AlertUnit::Minutes),
            alert(r"(\d+)\s*h\s*oldin", AlertUnit::Hours),
            alert(r"(\d+)\s*d\s*oldin", AlertUnit::Days),
            alert(r"(\d+)\s*w\s*oldin", AlertUnit::Weeks),
            alert(r"eslatma\s*(\d+)\s*daqiqa", AlertUnit::Minutes),
            alert(r"eslatma\s*(\d+)\s*soat", AlertUnit::Hours),
        ],
        month_names: months(&[
            ("yanvar", 1),
            ("fevral", 2),
            ("mart", 3),
            ("aprel", 4),
            ("may", 5),
            ("iyun", 6),
            ("iyul", 7),
            ("avgust", 8),
            ("sentabr", 9),
            ("oktabr", 10),
            ("noyabr", 11),
            ("dekabr", 12),
        ]),
        month_first_slash_dates: false,
        default_title: "Uchrashuv".to_string(),
        suggestions: SuggestionTexts {
            time_missing: "Iltimos, vaqtni ko'rsating (masalan: 'ertaga 14:00', 'juma kuni')".to_string(),
            short_duration: "Bu vaqt juda qisqa, davomiylikni ko'paytirishni xohlaysizmi?".to_string(),
            long_duration: "Bu vaqt juda uzoq, davomiylikni qisqartirishni xohlaysizmi?".to_string(),
            add_alert: "Ogohlantirish qo'shishni xohlaysizmi?".to_string(),
            add_repeat: "Takrorlanish qo'shishni xohlaysizmi?".to_string(),
        },
        action_labels: ActionLabels {
            confirm: "Tasdiqlash".to_string(),
            edit: "Tahrirlash".to_string(),
            cancel: "Bekor qilish".to_string(),
        },
    }
}

fn russian() -> LanguageRules {
    use DayRef::*;
    LanguageRules {
        detection_keywords: words(&["и", "но", "или", "для", "с", "в", "на", "по"]),
        intents: vec![
            (Intent::Create, words(&["создать", "добавить", "создай", "добавь"])),
            (Intent::Update, words(&["изменить", "обновить", "редактировать", "измен"])),
            (Intent::Delete, words(&["удалить", "убрать", "стереть", "удали"])),
            (Intent::Show, words(&["показать", "посмотреть", "найти", "искать"])),
            (Intent::Remind, words(&["напомнить", "напоминание", "напомни"])),
            (Intent::Cancel, words(&["отменить", "отмена", "отмени"])),
        ],
        stop_words: words(&["для", "с", "в", "на", "по", "и", "но", "или"]),
        all_day: words(&["целый день", "весь день", "на весь день", "полный день"]),
        day_keywords: days(&[
            ("завтра", Offset(1)),
            ("сегодня", Offset(0)),
            ("вчера", Offset(-1)),
            ("понедельник", Next(Weekday::Mon)),
            ("вторник", Next(Weekday::Tue)),
            ("среда", Next(Weekday::Wed)),
            ("среду", Next(Weekday::Wed)),
            ("четверг", Next(Weekday::Thu)),
            ("пятница", Next(Weekday::Fri)),
            ("пятницу", Next(Weekday::Fri)),
            ("суббота", Next(Weekday::Sat)),
            ("субботу", Next(Weekday::Sat)),
            ("воскресенье", Next(Weekday::Sun)),
        ]),
        recurrence: pairs(&[
            ("раз в две недели", BIWEEKLY),
            ("каждые две недели", BIWEEKLY),
            ("каждый день", DAILY),
            ("ежедневно", DAILY),
            ("каждую неделю", WEEKLY),
            ("еженедельно", WEEKLY),
            ("каждый месяц", MONTHLY),
            ("ежемесячно", MONTHLY),
            ("каждый год", YEARLY),
            ("ежегодно", YEARLY),
            ("каждый понедельник", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("по понедельникам", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("каждую пятницу", "RRULE:FREQ=WEEKLY;BYDAY=FR"),
            ("по пятницам", "RRULE:FREQ=WEEKLY;BYDAY=FR"),
        ]),
        alerts: vec![
            alert(r"(\d+)\s*минут\w*\s*(?:до|перед)", AlertUnit::Minutes),
            alert(r"(\d+)\s*час\w*\s*(?:до|перед)", AlertUnit::Hours),
            alert(r"(\d+)\s*дн\w*\s*(?:до|перед)", AlertUnit::Days),
            alert(r"(\d+)\s*недел\w*\s*(?:до|перед)", AlertUnit::Weeks),
            alert(r"(\d+)\s*м\s*(?:до|перед)", AlertUnit::Minutes),
            alert(r"(\d+)\s*ч\s*(?:до|перед)", AlertUnit::Hours),
            alert(r"(\d+)\s*д\s*(?:до|перед)", AlertUnit::Days),
            alert(r"(\d+)\s*н\s*(?:до|перед)", AlertUnit::Weeks),
            alert(r"напомин\w+\s*(\d+)\s*минут", AlertUnit::Minutes),
            alert(r"напомин\w+\s*(\d+)\s*час", AlertUnit::Hours),
        ],
        month_names: months(&[
            ("января", 1),
            ("февраля", 2),
            ("марта", 3),
            ("апреля", 4),
            ("мая", 5),
            ("июня", 6),
            ("июля", 7),
            ("августа", 8),
            ("сентября", 9),
            ("октября", 10),
            ("ноября", 11),
            ("декабря", 12),
        ]),
        month_first_slash_dates: false,
        default_title: "Встреча".to_string(),
        suggestions: SuggestionTexts {
            time_missing: "Пожалуйста, укажите время (например: 'завтра 14:00', 'в пятницу')".to_string(),
            short_duration: "Это очень короткое время, хотите увеличить продолжительность?".to_string(),
            long_duration: "Это очень долгое время, хотите сократить продолжительность?".to_string(),
            add_alert: "Хотите добавить напоминание?".to_string(),
            add_repeat: "Хотите добавить повторение?".to_string(),
        },
        action_labels: ActionLabels {
            confirm: "Подтвердить".to_string(),
            edit: "Редактировать".to_string(),
            cancel: "Отменить".to_string(),
        },
    }
}

fn english() -> LanguageRules {
    use DayRef::*;
    LanguageRules {
        detection_keywords: words(&["the", "and", "for", "with", "that", "this", "have", "has"]),
        intents: vec![
            (Intent::Create, words(&["create", "add", "make", "new"])),
            (Intent::Update, words(&["update", "edit", "change", "modify"])),
            (Intent::Delete, words(&["delete", "remove", "erase", "cancel"])),
            (Intent::Show, words(&["show", "view", "find", "search"])),
            (Intent::Remind, words(&["remind", "alert", "notify"])),
            (Intent::Cancel, words(&["cancel", "stop", "abort"])),
        ],
        stop_words: words(&["for", "with", "at", "on", "in", "and", "but", "or", "the"]),
        all_day: words(&["all day", "whole day", "full day", "entire day"]),
        day_keywords: days(&[
            ("tomorrow", Offset(1)),
            ("today", Offset(0)),
            ("yesterday", Offset(-1)),
            ("monday", Next(Weekday::Mon)),
            ("tuesday", Next(Weekday::Tue)),
            ("wednesday", Next(Weekday::Wed)),
            ("thursday", Next(Weekday::Thu)),
            ("friday", Next(Weekday::Fri)),
            ("saturday", Next(Weekday::Sat)),
            ("sunday", Next(Weekday::Sun)),
        ]),
        recurrence: pairs(&[
            ("bi-weekly", BIWEEKLY),
            ("biweekly", BIWEEKLY),
            ("every other week", BIWEEKLY),
            ("every two weeks", BIWEEKLY),
            ("every day", DAILY),
            ("daily", DAILY),
            ("every weekday", "RRULE:FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"),
            ("every week", WEEKLY),
            ("weekly", WEEKLY),
            ("every month", MONTHLY),
            ("monthly", MONTHLY),
            ("every year", YEARLY),
            ("yearly", YEARLY),
            ("annually", YEARLY),
            ("every monday", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("every tuesday", "RRULE:FREQ=WEEKLY;BYDAY=TU"),
            ("every wednesday", "RRULE:FREQ=WEEKLY;BYDAY=WE"),
            ("every thursday", "RRULE:FREQ=WEEKLY;BYDAY=TH"),
            ("every friday", "RRULE:FREQ=WEEKLY;BYDAY=FR"),
            ("every saturday", "RRULE:FREQ=WEEKLY;BYDAY=SA"),
            ("every sunday", "RRULE:FREQ=WEEKLY;BYDAY=SU"),
            ("on mondays", "RRULE:FREQ=WEEKLY;BYDAY=MO"),
            ("on fridays", "RRULE:FREQ=WEEKLY;BYDAY=FR"),
        ]),
        alerts: vec![
            alert(r"(\d+)\s*minutes?\s*before", AlertUnit::Minutes),
            alert(r"(\d+)\s*hours?\s*before", AlertUnit::Hours),
            alert(r"(\d+)\s*days?\s*before", AlertUnit::Days),
            alert(r"(\d+)\s*weeks?\s*before", AlertUnit::Weeks),
            alert(r"(\d+)\s*m\s*before", AlertUnit::Minutes),
            alert(r"(\d+)\s*h\s*before", AlertUnit::Hours),
            alert(r"(\d+)\s*d\s*before", AlertUnit::Days),
            alert(r"(\d+)\s*w\s*before", AlertUnit::Weeks),
            alert(r"remind\w*\s*(\d+)\s*minutes?", AlertUnit::Minutes),
            alert(r"remind\w*\s*(\d+)\s*hours?", AlertUnit::Hours),
        ],
        month_names: months(&[
            ("january", 1),
            ("february", 2),
            ("march", 3),
            ("april", 4),
            ("may", 5),
            ("june", 6),
            ("july", 7),
            ("august", 8),
            ("september", 9),
            ("october", 10),
            ("november", 11),
            ("december", 12),
            ("jan", 1),
            ("feb", 2),
            ("mar", 3),
            ("apr", 4),
            ("jun", 6),
            ("jul", 7),
            ("aug", 8),
            ("sep", 9),
            ("oct", 10),
            ("nov", 11),
            ("dec", 12),
        ]),
        month_first_slash_dates: true,
        default_title: "Meeting".to_string(),
        suggestions: SuggestionTexts {
            time_missing: "Please specify time (e.g., 'tomorrow 14:00', 'on Friday')".to_string(),
            short_duration: "This is very short duration, do you want to extend it?".to_string(),
            long_duration: "This is very long duration, do you want to shorten it?".to_string(),
            add_alert: "Do you want to add an alert?".to_string(),
            add_repeat: "Do you want to add repetition?".to_string(),
        },
        action_labels: ActionLabels {
            confirm: "Confirm".to_string(),
            edit: "Edit".to_string(),
            cancel: "Cancel".to_string(),
        },
    }
}

//! Natural-language request interpreter for Uzbek, Russian and English.
//!
//! `Interpreter::interpret` is the single entry point. It runs language
//! detection, slot extraction, intent classification, confidence scoring and
//! suggestion generation in that order. Apart from an empty or oversized
//! prompt it never fails: the worst outcome is a low-confidence interpretation
//! carrying suggestions.

pub mod intent;
pub mod language;
pub mod rules;
pub mod scoring;
pub mod slots;

use log::debug;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub use intent::Intent;
pub use language::{Language, LanguageDetector};
pub use rules::RuleTables;
pub use slots::{ExtractedFields, ExtractionContext, TimeSource, TitleSource};

#[derive(Debug, Error, PartialEq)]
pub enum InterpretError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Prompt is longer than {limit} characters")]
    TooLong { limit: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub intent: Intent,
    pub language: Language,
    pub confidence: f64,
    pub extracted_fields: ExtractedFields,
    pub suggestions: Vec<String>,
}

pub struct Interpreter {
    tables: Arc<RuleTables>,
    detector: LanguageDetector,
    max_prompt_chars: usize,
}

impl Interpreter {
    pub fn new(tables: Arc<RuleTables>, statistical_detection: bool, max_prompt_chars: usize) -> Self {
        Self {
            detector: LanguageDetector::new(Arc::clone(&tables), statistical_detection),
            tables,
            max_prompt_chars,
        }
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    /// `hint` skips detection when the caller already knows the language.
    pub fn interpret(
        &self,
        text: &str,
        hint: Option<Language>,
        ctx: &ExtractionContext,
    ) -> Result<Interpretation, InterpretError> {
        if text.trim().is_empty() {
            return Err(InterpretError::EmptyPrompt);
        }
        if text.chars().count() > self.max_prompt_chars {
            return Err(InterpretError::TooLong {
                limit: self.max_prompt_chars,
            });
        }

        let language = hint.unwrap_or_else(|| self.detector.detect(text));
        let extracted_fields = slots::extract(&self.tables, text, language, ctx);
        let intent = intent::classify(&self.tables, &text.to_lowercase(), language);
        let confidence = scoring::score(&self.tables, &extracted_fields);
        let suggestions = scoring::suggest(&self.tables, &extracted_fields, language);

        debug!(
            "Interpreted as {} [{}] with confidence {:.2}",
            intent, language, confidence
        );

        Ok(Interpretation {
            intent,
            language,
            confidence,
            extracted_fields,
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Tashkent;

    fn interpreter() -> Interpreter {
        Interpreter::new(RuleTables::builtin(), false, 1000)
    }

    fn ctx() -> ExtractionContext {
        ExtractionContext::new(Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap(), Tashkent)
    }

    #[test]
    fn blank_prompts_are_rejected() {
        assert_eq!(
            interpreter().interpret("   ", None, &ctx()).unwrap_err(),
            InterpretError::EmptyPrompt
        );
    }

    #[test]
    fn oversized_prompts_are_rejected() {
        let small = Interpreter::new(RuleTables::builtin(), false, 10);
        assert_eq!(
            small.interpret("a very long prompt", None, &ctx()).unwrap_err(),
            InterpretError::TooLong { limit: 10 }
        );
    }

    #[test]
    fn language_hint_skips_detection() {
        let result = interpreter()
            .interpret("Lunch with the team", Some(Language::Uz), &ctx())
            .unwrap();
        assert_eq!(result.language, Language::Uz);
    }

    #[test]
    fn injected_tables_change_behaviour() {
        let mut tables = RuleTables::default();
        if let Some(en) = tables.rules_mut(Language::En) {
            en.intents.insert(0, (Intent::Show, vec!["agenda".to_string()]));
        }
        let custom = Interpreter::new(Arc::new(tables), false, 1000);
        let result = custom
            .interpret("add agenda item", Some(Language::En), &ctx())
            .unwrap();
        assert_eq!(result.intent, Intent::Show);

        let stock = interpreter()
            .interpret("add agenda item", Some(Language::En), &ctx())
            .unwrap();
        assert_eq!(stock.intent, Intent::Create);
    }
}

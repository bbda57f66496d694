//! Validation helpers for data arriving through the direct event API.

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{CoreError, CoreResult};

const MAX_TITLE_CHARS: usize = 200;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]{1,64}@(?:[A-Za-z0-9-]{1,63}\.){1,125}[A-Za-z]{2,63}$").unwrap()
});

pub fn validate_email(email: &str) -> bool {
    EMAIL.is_match(email) && !contains_dangerous_characters(email)
}

/// Characters that have no business in an address and break downstream templating.
pub fn contains_dangerous_characters(input: &str) -> bool {
    input.contains(';')
        || input.contains('&')
        || input.contains('|')
        || input.contains('<')
        || input.contains('>')
        || input.contains('$')
}

pub fn validate_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

pub fn check_title(title: &str) -> CoreResult<()> {
    let length = title.trim().chars().count();
    if length == 0 {
        return Err(CoreError::validation("Title must not be empty"));
    }
    if length > MAX_TITLE_CHARS {
        return Err(CoreError::validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

pub fn check_range(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> CoreResult<()> {
    if start >= end {
        return Err(CoreError::validation("time_start must be before time_end"));
    }
    Ok(())
}

pub fn check_emails(emails: &[String]) -> CoreResult<()> {
    if let Some(bad) = emails.iter().find(|e| !validate_email(e)) {
        return Err(CoreError::validation(format!("Invalid email format: {}", bad)));
    }
    Ok(())
}

pub fn check_url(url: Option<&str>) -> CoreResult<()> {
    match url {
        Some(value) if !validate_url(value) => {
            Err(CoreError::validation(format!("Invalid URL: {}", value)))
        }
        _ => Ok(()),
    }
}

//! Persisted records: requests, drafts, events, invites, alerts and audit entries.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::parser::intent::Intent;
use crate::parser::language::Language;
use crate::parser::slots::time_extractor::localize;
use crate::parser::slots::ExtractedFields;

/// Identity handed to the core by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caller {
    pub id: Uuid,
    pub email: String,
    pub timezone: Tz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRequest {
    pub id: Uuid,
    pub owner: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftState {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub owner: Uuid,
    pub request_id: Uuid,
    pub original_text: String,
    pub language: Language,
    pub intent: Intent,
    pub confidence: f64,
    pub extracted: ExtractedFields,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Draft {
    /// Cancelled drafts are deleted, so a stored draft is never `Cancelled`.
    pub fn state(&self, now: DateTime<Utc>) -> DraftState {
        if self.is_confirmed {
            DraftState::Confirmed
        } else if now >= self.expires_at {
            DraftState::Expired
        } else {
            DraftState::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub all_day: bool,
    pub time_start: DateTime<FixedOffset>,
    pub time_end: DateTime<FixedOffset>,
    pub repeat: Option<String>,
    pub url: Option<String>,
    pub note: Option<String>,
    pub is_cancelled: bool,
    pub timezone: String,
    pub draft_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// Timezone the event was created in, or `fallback` for unknown labels.
    pub fn tz(&self, fallback: Tz) -> Tz {
        self.timezone.parse().unwrap_or(fallback)
    }

    /// Snap all-day events to the first and last instant of their days.
    pub fn normalize_all_day(&mut self, tz: Tz) {
        if !self.all_day {
            return;
        }
        self.time_start = start_of_day(self.time_start, tz);
        self.time_end = end_of_day(self.time_end, tz);
    }
}

fn start_of_day(at: DateTime<FixedOffset>, tz: Tz) -> DateTime<FixedOffset> {
    let date = at.with_timezone(&tz).date_naive();
    localize(date.and_time(NaiveTime::MIN), tz)
}

fn end_of_day(at: DateTime<FixedOffset>, tz: Tz) -> DateTime<FixedOffset> {
    let date = at.with_timezone(&tz).date_naive();
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    localize(date.and_time(last), tz)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub event_id: Uuid,
    pub email: String,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertUnit {
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
    #[serde(rename = "w")]
    Weeks,
}

impl AlertUnit {
    pub fn letter(&self) -> char {
        match self {
            AlertUnit::Minutes => 'm',
            AlertUnit::Hours => 'h',
            AlertUnit::Days => 'd',
            AlertUnit::Weeks => 'w',
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            AlertUnit::Minutes => 60,
            AlertUnit::Hours => 3_600,
            AlertUnit::Days => 86_400,
            AlertUnit::Weeks => 604_800,
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'm' => Some(AlertUnit::Minutes),
            'h' => Some(AlertUnit::Hours),
            'd' => Some(AlertUnit::Days),
            'w' => Some(AlertUnit::Weeks),
            _ => None,
        }
    }
}

static ALERT_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([mhdw])$").unwrap());

/// Parse a `<integer><unit>` label such as `15m`. Anything else is `None`.
pub fn parse_alert_label(label: &str) -> Option<(u32, AlertUnit)> {
    let caps = ALERT_LABEL.captures(label)?;
    let value = caps[1].parse().ok()?;
    let unit = caps[2].chars().next().and_then(AlertUnit::from_letter)?;
    Some((value, unit))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub event_id: Uuid,
    pub value: u32,
    pub unit: AlertUnit,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn offset_seconds(&self) -> i64 {
        i64::from(self.value) * self.unit.seconds()
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.value, self.unit.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Parse,
    Invite,
    AlertScheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: Uuid,
    pub event_id: Option<Uuid>,
    pub action: AuditAction,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub changes: Value,
    pub created_at: DateTime<Utc>,
}

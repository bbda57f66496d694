//! Wire shapes of everything a session sends back.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::CoreError;
use crate::events::Materialized;
use crate::models::{Alert, CalendarEvent, Draft, Invite};
use crate::parser::{ExtractedFields, Intent, Language, RuleTables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// One outgoing message: a `Reply` plus its status and send time.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub reply: Reply,
}

impl Envelope {
    pub fn new(reply: Reply, timestamp: DateTime<Utc>) -> Self {
        let status = match reply {
            Reply::Error { .. } => Status::Error,
            _ => Status::Success,
        };
        Self {
            status,
            timestamp,
            reply,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({ "type": "error", "status": "error", "code": "internal", "message": e.to_string() })
                .to_string()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextAction {
    pub action: &'static str,
    pub label: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftPreview {
    pub draft_id: Uuid,
    pub request_id: Uuid,
    pub intent: Intent,
    pub language: Language,
    pub confidence: f64,
    pub extracted_data: ExtractedFields,
    pub suggestions: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub next_actions: Vec<NextAction>,
}

impl DraftPreview {
    pub fn new(draft: &Draft, suggestions: Vec<String>, tables: &RuleTables) -> Self {
        let labels = &tables.rules(draft.language).action_labels;
        let data = json!({ "draft_id": draft.id });
        let next_actions = vec![
            NextAction {
                action: "confirm_draft",
                label: labels.confirm.clone(),
                data: data.clone(),
            },
            NextAction {
                action: "edit_draft",
                label: labels.edit.clone(),
                data: data.clone(),
            },
            NextAction {
                action: "cancel_draft",
                label: labels.cancel.clone(),
                data,
            },
        ];

        Self {
            draft_id: draft.id,
            request_id: draft.request_id,
            intent: draft.intent,
            language: draft.language,
            confidence: draft.confidence,
            extracted_data: draft.extracted.clone(),
            suggestions,
            expires_at: draft.expires_at,
            next_actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftSummary {
    pub id: Uuid,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub invites_count: usize,
    pub alerts_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    ConnectionSuccess {
        message: String,
        user: SessionUser,
    },
    DraftPreview(Box<DraftPreview>),
    DraftUpdated {
        draft_id: Uuid,
        updated_fields: Vec<String>,
        extracted_data: ExtractedFields,
    },
    DraftCancelled {
        draft_id: Uuid,
    },
    EventCreated {
        event: CalendarEvent,
        invites: Vec<Invite>,
        alerts: Vec<Alert>,
        #[serde(skip_serializing_if = "Option::is_none")]
        draft: Option<DraftSummary>,
        statistics: Statistics,
    },
    EventList {
        events: Vec<CalendarEvent>,
        count: usize,
    },
    EventUpdated {
        event: CalendarEvent,
        changed_fields: Vec<String>,
    },
    EventDeleted {
        event_id: Uuid,
        title: String,
    },
    InviteResponded {
        invite: Invite,
    },
    EventNotification {
        event_id: Uuid,
        title: String,
        time_start: DateTime<FixedOffset>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        missing_fields: Vec<String>,
    },
}

impl Reply {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Reply::Error {
            code: code.to_string(),
            message: message.into(),
            missing_fields: Vec::new(),
        }
    }

    pub fn event_created(created: Materialized, draft: Option<&Draft>) -> Self {
        Reply::EventCreated {
            statistics: Statistics {
                invites_count: created.invites.len(),
                alerts_count: created.alerts.len(),
            },
            draft: draft.map(|d| DraftSummary {
                id: d.id,
                confirmed_at: d.confirmed_at,
            }),
            event: created.event,
            invites: created.invites,
            alerts: created.alerts,
        }
    }

    pub fn notification(event: &CalendarEvent) -> Self {
        Reply::EventNotification {
            event_id: event.id,
            title: event.title.clone(),
            time_start: event.time_start,
        }
    }
}

impl From<&CoreError> for Reply {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Validation {
                message,
                missing_fields,
            } => Reply::Error {
                code: err.code().to_string(),
                message: message.clone(),
                missing_fields: missing_fields.clone(),
            },
            CoreError::NotFoundOrExpired(_) => Reply::error(err.code(), err.to_string()),
            CoreError::Materialization(_) => {
                Reply::error(err.code(), "Could not create the event, please try again")
            }
            CoreError::Storage(_) => Reply::error(err.code(), "Internal error"),
        }
    }
}

//! Decides what goes into the audit trail and in what shape.
//!
//! Every method appends exactly one entry to the tables it is given, so audit
//! records commit or roll back together with the change they describe.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::{
    Alert, AuditAction, AuditEntry, CalendarEvent, Draft, DraftState, Invite, RawRequest,
};
use crate::parser::Interpretation;
use crate::storage::Tables;

const EXCERPT_CHARS: usize = 100;

pub const SUBJECT_REQUEST: &str = "UserRequest";
pub const SUBJECT_DRAFT: &str = "Draft";
pub const SUBJECT_EVENT: &str = "Event";
pub const SUBJECT_INVITE: &str = "Invite";
pub const SUBJECT_ALERT: &str = "Alert";

pub struct AuditRecorder {
    actor: Uuid,
    at: DateTime<Utc>,
}

impl AuditRecorder {
    pub fn new(actor: Uuid, at: DateTime<Utc>) -> Self {
        Self { actor, at }
    }

    fn record(
        &self,
        tables: &mut Tables,
        event_id: Option<Uuid>,
        action: AuditAction,
        subject_type: &str,
        subject_id: Uuid,
        changes: Value,
    ) {
        tables.append_audit(AuditEntry {
            id: Uuid::new_v4(),
            actor: self.actor,
            event_id,
            action,
            subject_type: subject_type.to_string(),
            subject_id,
            changes,
            created_at: self.at,
        });
    }

    pub fn request_received(&self, tables: &mut Tables, request: &RawRequest) {
        self.record(
            tables,
            None,
            AuditAction::Create,
            SUBJECT_REQUEST,
            request.id,
            json!({ "text": [Value::Null, request.text] }),
        );
    }

    pub fn parsed(&self, tables: &mut Tables, request: &RawRequest, interpretation: &Interpretation) {
        self.record(
            tables,
            None,
            AuditAction::Parse,
            SUBJECT_REQUEST,
            request.id,
            json!({
                "original_text": excerpt(&request.text),
                "parse_result": {
                    "intent": interpretation.intent,
                    "language": interpretation.language,
                    "confidence": interpretation.confidence,
                },
            }),
        );
    }

    pub fn draft_created(&self, tables: &mut Tables, draft: &Draft) {
        self.record(
            tables,
            None,
            AuditAction::Create,
            SUBJECT_DRAFT,
            draft.id,
            json!({ "intent": [Value::Null, draft.intent] }),
        );
    }

    pub fn draft_edited(&self, tables: &mut Tables, draft: &Draft, edits: &Value, keys: &[String]) {
        self.record(
            tables,
            None,
            AuditAction::Update,
            SUBJECT_DRAFT,
            draft.id,
            json!({ "edits": edits, "changed_keys": keys }),
        );
    }

    pub fn draft_cancelled(&self, tables: &mut Tables, draft: &Draft) {
        self.record(
            tables,
            None,
            AuditAction::Delete,
            SUBJECT_DRAFT,
            draft.id,
            json!({
                "original_text": excerpt(&draft.original_text),
                "state": [DraftState::Pending, DraftState::Cancelled],
            }),
        );
    }

    pub fn draft_expired(&self, tables: &mut Tables, draft: &Draft) {
        self.record(
            tables,
            None,
            AuditAction::Delete,
            SUBJECT_DRAFT,
            draft.id,
            json!({
                "reason": "expired",
                "state": [DraftState::Pending, DraftState::Expired],
            }),
        );
    }

    pub fn event_created(&self, tables: &mut Tables, event: &CalendarEvent) {
        let mut changes = Map::new();
        if let Some(draft_id) = event.draft_id {
            changes.insert("from_draft".to_string(), json!(draft_id));
        }
        changes.insert("title".to_string(), json!(event.title));
        changes.insert("time_start".to_string(), json!(event.time_start));
        changes.insert("time_end".to_string(), json!(event.time_end));
        self.record(
            tables,
            Some(event.id),
            AuditAction::Create,
            SUBJECT_EVENT,
            event.id,
            Value::Object(changes),
        );
    }

    pub fn event_updated(&self, tables: &mut Tables, event: &CalendarEvent, diff: Value) {
        self.record(
            tables,
            Some(event.id),
            AuditAction::Update,
            SUBJECT_EVENT,
            event.id,
            diff,
        );
    }

    pub fn event_cancelled(&self, tables: &mut Tables, event: &CalendarEvent) {
        self.record(
            tables,
            Some(event.id),
            AuditAction::Delete,
            SUBJECT_EVENT,
            event.id,
            json!({ "is_cancelled": [false, true], "title": event.title }),
        );
    }

    pub fn invite_created(&self, tables: &mut Tables, invite: &Invite) {
        self.record(
            tables,
            Some(invite.event_id),
            AuditAction::Invite,
            SUBJECT_INVITE,
            invite.id,
            json!({ "email": [Value::Null, invite.email] }),
        );
    }

    pub fn invite_responded(&self, tables: &mut Tables, invite: &Invite, previous: Value) {
        self.record(
            tables,
            Some(invite.event_id),
            AuditAction::Update,
            SUBJECT_INVITE,
            invite.id,
            json!({ "status": [previous, invite.status] }),
        );
    }

    pub fn alert_scheduled(&self, tables: &mut Tables, alert: &Alert, fire_at: Value) {
        self.record(
            tables,
            Some(alert.event_id),
            AuditAction::AlertScheduled,
            SUBJECT_ALERT,
            alert.id,
            json!({ "scheduled_for": [Value::Null, fire_at], "offset": alert.label() }),
        );
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

//! Committed calendar events: materialization, listing, edits, soft
//! cancellation and invite responses.

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::error::{CoreError, CoreResult};
use crate::models::{parse_alert_label, Alert, CalendarEvent, Caller, Invite, InviteStatus};
use crate::parser::ExtractedFields;
use crate::scheduling::{self, AlertSchedule};
use crate::storage::{Store, Tables};
use crate::validation;

/// Everything needed to commit one event with its invites and alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub all_day: bool,
    pub time_start: DateTime<FixedOffset>,
    pub time_end: DateTime<FixedOffset>,
    pub repeat: Option<String>,
    pub url: Option<String>,
    pub note: Option<String>,
    pub invites: Vec<String>,
    pub alerts: Vec<String>,
}

impl From<&ExtractedFields> for NewEvent {
    fn from(fields: &ExtractedFields) -> Self {
        Self {
            title: fields.title.clone(),
            all_day: fields.all_day,
            time_start: fields.time_start,
            time_end: fields.time_end,
            repeat: fields.repeat.clone(),
            url: fields.url.clone(),
            note: fields.note.clone(),
            invites: fields.invite.clone(),
            alerts: fields.alert.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Materialized {
    pub event: CalendarEvent,
    pub invites: Vec<Invite>,
    pub alerts: Vec<Alert>,
    #[serde(skip)]
    pub schedules: Vec<AlertSchedule>,
}

/// Commit an event, one invite per address and one alert per well-formed
/// label into `tables`. Malformed alert labels are dropped.
pub(crate) fn materialize(
    tables: &mut Tables,
    audit: &AuditRecorder,
    owner: &Caller,
    new: NewEvent,
    draft_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> CoreResult<Materialized> {
    let mut event = CalendarEvent {
        id: Uuid::new_v4(),
        owner: owner.id,
        title: new.title,
        all_day: new.all_day,
        time_start: new.time_start,
        time_end: new.time_end,
        repeat: new.repeat,
        url: new.url,
        note: new.note,
        is_cancelled: false,
        timezone: owner.timezone.name().to_string(),
        draft_id,
        created_at: now,
        updated_at: now,
    };
    event.normalize_all_day(owner.timezone);
    if event.time_start >= event.time_end {
        return Err(CoreError::Materialization(
            "time_start must be before time_end".to_string(),
        ));
    }

    tables.insert_event(event.clone());
    audit.event_created(tables, &event);

    let mut invites = Vec::with_capacity(new.invites.len());
    for email in new.invites {
        if invites.iter().any(|i: &Invite| i.email.eq_ignore_ascii_case(&email)) {
            debug!("Skipping repeated invite '{}' for event {}", email, event.id);
            continue;
        }
        let invite = Invite {
            id: Uuid::new_v4(),
            event_id: event.id,
            email,
            status: InviteStatus::Pending,
            created_at: now,
            responded_at: None,
        };
        tables
            .insert_invite(invite.clone())
            .map_err(|e| CoreError::Materialization(e.to_string()))?;
        audit.invite_created(tables, &invite);
        invites.push(invite);
    }

    let mut alerts = Vec::new();
    let mut schedules = Vec::new();
    for label in new.alerts {
        let Some((value, unit)) = parse_alert_label(&label) else {
            debug!("Dropping malformed alert '{}' for event {}", label, event.id);
            continue;
        };
        let alert = Alert {
            id: Uuid::new_v4(),
            event_id: event.id,
            value,
            unit,
            is_sent: false,
            sent_at: None,
        };
        let Some(schedule) = AlertSchedule::for_alert(&event, &alert) else {
            debug!("Dropping out-of-range alert '{}' for event {}", label, event.id);
            continue;
        };
        tables.insert_alert(alert.clone());
        audit.alert_scheduled(tables, &alert, json!(schedule.fire_at));
        alerts.push(alert);
        schedules.push(schedule);
    }

    Ok(Materialized {
        event,
        invites,
        alerts,
        schedules,
    })
}

/// Optional bounds for listing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRange {
    /// Keep events starting at or after this instant.
    pub start: Option<DateTime<FixedOffset>>,
    /// Keep events ending at or before this instant.
    pub end: Option<DateTime<FixedOffset>>,
}

/// Field overrides for an existing event. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub all_day: Option<bool>,
    pub time_start: Option<DateTime<FixedOffset>>,
    pub time_end: Option<DateTime<FixedOffset>>,
    pub repeat: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub note: Option<Option<String>>,
}

#[derive(Clone)]
pub struct EventManager {
    store: Arc<Store>,
}

impl EventManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Direct creation, bypassing drafts.
    pub fn create(&self, caller: &Caller, new: NewEvent, now: DateTime<Utc>) -> CoreResult<Materialized> {
        validation::check_title(&new.title)?;
        validation::check_range(new.time_start, new.time_end)?;
        validation::check_emails(&new.invites)?;
        validation::check_url(new.url.as_deref())?;
        let schedulable = |label: &str| {
            parse_alert_label(label).and_then(|(value, unit)| {
                scheduling::fire_at(new.time_start, i64::from(value) * unit.seconds())
            })
        };
        if let Some(bad) = new.alerts.iter().find(|a| schedulable(a).is_none()) {
            return Err(CoreError::validation(format!("Invalid alert: {}", bad)));
        }
        for (i, email) in new.invites.iter().enumerate() {
            if new.invites[..i].iter().any(|e| e.eq_ignore_ascii_case(email)) {
                return Err(CoreError::validation(format!("Duplicate invite: {}", email)));
            }
        }

        let audit = AuditRecorder::new(caller.id, now);
        let created = self
            .store
            .transaction(|tx| materialize(tx, &audit, caller, new, None, now))?;
        info!("Event {} created for {}", created.event.id, caller.id);
        Ok(created)
    }

    /// Live events the caller owns or has accepted an invite to, by start time.
    pub fn list(&self, caller: &Caller, range: &EventRange) -> CoreResult<Vec<CalendarEvent>> {
        let mut events = self.store.read(|t| {
            t.events()
                .filter(|e| !e.is_cancelled)
                .filter(|e| {
                    e.owner == caller.id
                        || t.invites_for(e.id).any(|i| {
                            i.status == InviteStatus::Accepted
                                && i.email.eq_ignore_ascii_case(&caller.email)
                        })
                })
                .filter(|e| range.start.map_or(true, |s| e.time_start >= s))
                .filter(|e| range.end.map_or(true, |end| e.time_end <= end))
                .cloned()
                .collect::<Vec<_>>()
        });
        events.sort_by_key(|e| e.time_start);
        Ok(events)
    }

    pub fn update(
        &self,
        caller: &Caller,
        event_id: Uuid,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> CoreResult<(CalendarEvent, Vec<String>)> {
        if let Some(title) = &patch.title {
            validation::check_title(title)?;
        }
        if let Some(Some(url)) = &patch.url {
            validation::check_url(Some(url))?;
        }

        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            let event = tx
                .event_mut(event_id)
                .filter(|e| e.owner == caller.id && !e.is_cancelled)
                .ok_or_else(|| CoreError::NotFoundOrExpired("Event".to_string()))?;

            let before = event.clone();
            if let Some(title) = patch.title {
                event.title = title;
            }
            if let Some(all_day) = patch.all_day {
                event.all_day = all_day;
            }
            if let Some(start) = patch.time_start {
                event.time_start = start;
            }
            if let Some(end) = patch.time_end {
                event.time_end = end;
            }
            if let Some(repeat) = patch.repeat {
                event.repeat = repeat;
            }
            if let Some(url) = patch.url {
                event.url = url;
            }
            if let Some(note) = patch.note {
                event.note = note;
            }
            let tz = event.tz(caller.timezone);
            event.normalize_all_day(tz);
            validation::check_range(event.time_start, event.time_end)?;

            let diff = diff_events(&before, event);
            let changed: Vec<String> = diff.iter().map(|(name, _)| name.to_string()).collect();
            if !changed.is_empty() {
                event.updated_at = now;
            }
            let updated = event.clone();
            if !changed.is_empty() {
                let changes: Map<String, Value> =
                    diff.into_iter().map(|(name, pair)| (name.to_string(), pair)).collect();
                audit.event_updated(tx, &updated, Value::Object(changes));
            }
            Ok((updated, changed))
        })
    }

    /// Soft cancellation: the event stays stored with `is_cancelled` set.
    pub fn cancel(&self, caller: &Caller, event_id: Uuid, now: DateTime<Utc>) -> CoreResult<CalendarEvent> {
        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            let event = tx
                .event_mut(event_id)
                .filter(|e| e.owner == caller.id && !e.is_cancelled)
                .ok_or_else(|| CoreError::NotFoundOrExpired("Event".to_string()))?;
            event.is_cancelled = true;
            event.updated_at = now;
            let cancelled = event.clone();
            audit.event_cancelled(tx, &cancelled);
            info!("Event {} cancelled by {}", cancelled.id, caller.id);
            Ok(cancelled)
        })
    }

    pub fn respond_invite(
        &self,
        caller: &Caller,
        invite_id: Uuid,
        response: InviteStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<Invite> {
        if response == InviteStatus::Pending {
            return Err(CoreError::validation("response must be accepted or declined"));
        }

        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            let invite = tx
                .invite_mut(invite_id)
                .filter(|i| i.email.eq_ignore_ascii_case(&caller.email))
                .ok_or_else(|| CoreError::NotFoundOrExpired("Invite".to_string()))?;
            let previous = json!(invite.status);
            invite.status = response;
            invite.responded_at = Some(now);
            let updated = invite.clone();
            audit.invite_responded(tx, &updated, previous);
            Ok(updated)
        })
    }
}

/// `[old, new]` for every field that differs, in declaration order.
fn diff_events(before: &CalendarEvent, after: &CalendarEvent) -> Vec<(&'static str, Value)> {
    let mut diff = Vec::new();
    let mut field = |name: &'static str, old: Value, new: Value| {
        if old != new {
            diff.push((name, json!([old, new])));
        }
    };
    field("title", json!(before.title), json!(after.title));
    field("all_day", json!(before.all_day), json!(after.all_day));
    field("time_start", json!(before.time_start), json!(after.time_start));
    field("time_end", json!(before.time_end), json!(after.time_end));
    field("repeat", json!(before.repeat), json!(after.repeat));
    field("url", json!(before.url), json!(after.url));
    field("note", json!(before.note), json!(after.note));
    diff
}

//! Draft lifecycle: pending drafts are edited, confirmed into events,
//! cancelled by their owner, or swept once they expire.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::error::{CoreError, CoreResult};
use crate::events::{materialize, Materialized, NewEvent};
use crate::models::{Caller, Draft, DraftState, RawRequest};
use crate::parser::slots::time_extractor::parse_timestamp;
use crate::parser::{Interpretation, TitleSource};
use crate::storage::{Store, Tables};
use crate::validation;

pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Caller-supplied overrides for a pending draft's fields. Absent keys are
/// left alone; `null` clears the optional ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftEdits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<Vec<String>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<String>>,
}

// Distinguishes a present `null` from a missing key.
pub(crate) fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl DraftEdits {
    /// Names of the supplied keys, in field order.
    pub fn keys(&self) -> Vec<String> {
        let supplied = [
            ("title", self.title.is_some()),
            ("all_day", self.all_day.is_some()),
            ("time_start", self.time_start.is_some()),
            ("time_end", self.time_end.is_some()),
            ("repeat", self.repeat.is_some()),
            ("invite", self.invite.is_some()),
            ("alert", self.alert.is_some()),
            ("url", self.url.is_some()),
            ("note", self.note.is_some()),
        ];
        supplied
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub draft: Draft,
    #[serde(flatten)]
    pub created: Materialized,
}

#[derive(Clone)]
pub struct DraftLifecycleManager {
    store: Arc<Store>,
    ttl: Duration,
}

impl DraftLifecycleManager {
    pub fn new(store: Arc<Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Store the prompt exactly as received.
    pub fn record_request(&self, caller: &Caller, text: &str, now: DateTime<Utc>) -> CoreResult<RawRequest> {
        let request = RawRequest {
            id: Uuid::new_v4(),
            owner: caller.id,
            text: text.to_string(),
            created_at: now,
        };
        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            tx.insert_request(request.clone());
            audit.request_received(tx, &request);
            Ok::<_, CoreError>(())
        })?;
        Ok(request)
    }

    pub fn create(
        &self,
        caller: &Caller,
        request: &RawRequest,
        interpretation: &Interpretation,
        now: DateTime<Utc>,
    ) -> CoreResult<Draft> {
        let draft = Draft {
            id: Uuid::new_v4(),
            owner: caller.id,
            request_id: request.id,
            original_text: request.text.clone(),
            language: interpretation.language,
            intent: interpretation.intent,
            confidence: interpretation.confidence,
            extracted: interpretation.extracted_fields.clone(),
            is_confirmed: false,
            confirmed_at: None,
            event_id: None,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            audit.parsed(tx, request, interpretation);
            tx.insert_draft(draft.clone());
            audit.draft_created(tx, &draft);
            Ok::<_, CoreError>(())
        })?;
        debug!("Draft {} created, expires at {}", draft.id, draft.expires_at);
        Ok(draft)
    }

    /// Shallow-merge `edits` into a pending draft. The expiry stays as it was.
    pub fn edit(
        &self,
        caller: &Caller,
        draft_id: Uuid,
        edits: DraftEdits,
        now: DateTime<Utc>,
    ) -> CoreResult<(Draft, Vec<String>)> {
        if let Some(title) = &edits.title {
            validation::check_title(title)?;
        }
        let time_start = edits
            .time_start
            .as_deref()
            .map(|v| timestamp("time_start", v, caller))
            .transpose()?;
        let time_end = edits
            .time_end
            .as_deref()
            .map(|v| timestamp("time_end", v, caller))
            .transpose()?;
        let keys = edits.keys();
        let recorded = serde_json::to_value(&edits).map_err(|e| CoreError::validation(e.to_string()))?;

        let audit = AuditRecorder::new(caller.id, now);
        let draft = self.store.transaction(|tx| {
            let draft = pending_draft_mut(tx, caller, draft_id, now)?;
            let fields = &mut draft.extracted;
            if let Some(title) = edits.title {
                fields.title = title;
                fields.title_source = TitleSource::Text;
            }
            if let Some(all_day) = edits.all_day {
                fields.all_day = all_day;
            }
            if let Some(start) = time_start {
                fields.time_start = start;
            }
            if let Some(end) = time_end {
                fields.time_end = end;
            }
            if let Some(repeat) = edits.repeat {
                fields.repeat = repeat;
            }
            if let Some(invite) = edits.invite {
                fields.invite = invite;
            }
            if let Some(alert) = edits.alert {
                fields.alert = alert;
            }
            if let Some(url) = edits.url {
                fields.url = url;
            }
            if let Some(note) = edits.note {
                fields.note = note;
            }
            let edited = draft.clone();
            audit.draft_edited(tx, &edited, &recorded, &keys);
            Ok::<_, CoreError>(edited)
        })?;
        Ok((draft, keys))
    }

    /// Turn a pending draft into an event with its invites and alerts.
    /// Either everything is committed or nothing is, and on failure the draft
    /// stays pending.
    pub fn confirm(&self, caller: &Caller, draft_id: Uuid, now: DateTime<Utc>) -> CoreResult<Confirmation> {
        let audit = AuditRecorder::new(caller.id, now);
        let confirmation = self
            .store
            .transaction(|tx| {
                let fields = pending_draft_mut(tx, caller, draft_id, now)?.extracted.clone();
                let created = materialize(tx, &audit, caller, NewEvent::from(&fields), Some(draft_id), now)?;

                let draft = tx
                    .draft_mut(draft_id)
                    .ok_or_else(|| CoreError::NotFoundOrExpired("Draft".to_string()))?;
                draft.is_confirmed = true;
                draft.confirmed_at = Some(now);
                draft.event_id = Some(created.event.id);
                Ok::<_, CoreError>(Confirmation {
                    draft: draft.clone(),
                    created,
                })
            })
            .map_err(|e| match e {
                CoreError::Storage(err) => CoreError::Materialization(err.to_string()),
                other => other,
            })?;

        info!(
            "Draft {} confirmed as event {} ({} invites, {} alerts)",
            draft_id,
            confirmation.created.event.id,
            confirmation.created.invites.len(),
            confirmation.created.alerts.len()
        );
        Ok(confirmation)
    }

    pub fn cancel(&self, caller: &Caller, draft_id: Uuid, now: DateTime<Utc>) -> CoreResult<Draft> {
        let audit = AuditRecorder::new(caller.id, now);
        self.store.transaction(|tx| {
            let draft = pending_draft_mut(tx, caller, draft_id, now)?.clone();
            audit.draft_cancelled(tx, &draft);
            tx.remove_draft(draft_id);
            Ok(draft)
        })
    }

    /// Remove unconfirmed drafts whose expiry lies before `now`. Returns how
    /// many were removed; failures are logged and count as zero.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let result = self.store.transaction(|tx| {
            let expired: Vec<Draft> = tx
                .drafts()
                .filter(|d| !d.is_confirmed && d.expires_at < now)
                .cloned()
                .collect();
            for draft in &expired {
                AuditRecorder::new(draft.owner, now).draft_expired(tx, draft);
                tx.remove_draft(draft.id);
            }
            Ok::<_, CoreError>(expired.len())
        });

        match result {
            Ok(0) => 0,
            Ok(count) => {
                info!("Swept {} expired drafts", count);
                count
            }
            Err(e) => {
                error!("Draft sweep failed: {}", e);
                0
            }
        }
    }
}

fn pending_draft_mut<'a>(
    tables: &'a mut Tables,
    caller: &Caller,
    draft_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<&'a mut Draft> {
    tables
        .draft_mut(draft_id)
        .filter(|d| d.owner == caller.id && d.state(now) == DraftState::Pending)
        .ok_or_else(|| CoreError::NotFoundOrExpired("Draft".to_string()))
}

fn timestamp(field: &str, value: &str, caller: &Caller) -> CoreResult<DateTime<FixedOffset>> {
    parse_timestamp(value, caller.timezone)
        .ok_or_else(|| CoreError::validation(format!("Invalid timestamp for {}: {}", field, value)))
}

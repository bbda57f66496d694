//! Per-connection request handling.
//!
//! A `SessionHandler` turns one inbound JSON message into exactly one reply
//! and, for newly created events, an optional notification for the owner's
//! other sessions. Messages look like `{"action": "...", "data": {...}}`; the
//! fields may also sit next to `action` at the top level.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::drafts::{explicit, DraftEdits, DraftLifecycleManager};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventManager, EventPatch, EventRange, NewEvent};
use crate::models::{Caller, InviteStatus};
use crate::parser::slots::time_extractor::{localize, parse_timestamp};
use crate::parser::{ExtractionContext, Interpreter, Language, RuleTables};
use crate::reply::{DraftPreview, Envelope, Reply, SessionUser};
use crate::scheduling::{AlertDispatcher, AlertSchedule};
use crate::storage::Store;

/// Everything a session needs, shared by all sessions of a server.
pub struct Services {
    pub interpreter: Interpreter,
    pub drafts: DraftLifecycleManager,
    pub events: EventManager,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: Arc<dyn AlertDispatcher>,
}

impl Services {
    pub fn new(
        config: &Config,
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self {
            interpreter: Interpreter::new(
                RuleTables::builtin(),
                config.interpreter.statistical_detection,
                config.interpreter.max_prompt_chars,
            ),
            drafts: DraftLifecycleManager::new(Arc::clone(&store), config.drafts.ttl()),
            events: EventManager::new(store),
            clock,
            dispatcher,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub reply: Envelope,
    /// For the owner's other sessions.
    pub broadcast: Option<Envelope>,
}

struct Handled {
    reply: Reply,
    broadcast: Option<Reply>,
    schedules: Vec<AlertSchedule>,
}

impl Handled {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            broadcast: None,
            schedules: Vec::new(),
        }
    }
}

type Handler = fn(&SessionHandler, &Value, DateTime<Utc>) -> CoreResult<Handled>;

static HANDLERS: Lazy<HashMap<&'static str, Handler>> = Lazy::new(|| {
    let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
    handlers.insert("parse_text", SessionHandler::parse_text);
    handlers.insert("edit_draft", SessionHandler::edit_draft);
    handlers.insert("confirm_draft", SessionHandler::confirm_draft);
    handlers.insert("cancel_draft", SessionHandler::cancel_draft);
    handlers.insert("create_event", SessionHandler::create_event);
    handlers.insert("get_events", SessionHandler::get_events);
    handlers.insert("update_event", SessionHandler::update_event);
    handlers.insert("delete_event", SessionHandler::delete_event);
    handlers.insert("respond_invite", SessionHandler::respond_invite);
    handlers
});

pub fn actions() -> Vec<&'static str> {
    let mut names: Vec<_> = HANDLERS.keys().copied().collect();
    names.sort_unstable();
    names
}

#[derive(Deserialize)]
struct ParseText {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize)]
struct DraftRef {
    draft_id: Uuid,
}

#[derive(Deserialize)]
struct EditDraft {
    draft_id: Uuid,
    edits: DraftEdits,
}

#[derive(Deserialize)]
struct CreateEvent {
    title: String,
    time_start: String,
    time_end: String,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    repeat: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    invites: Vec<String>,
    #[serde(default)]
    alerts: Vec<String>,
}

#[derive(Deserialize)]
struct GetEvents {
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Deserialize)]
struct UpdateEvent {
    event_id: Uuid,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    all_day: Option<bool>,
    #[serde(default)]
    time_start: Option<String>,
    #[serde(default)]
    time_end: Option<String>,
    #[serde(default, deserialize_with = "explicit")]
    repeat: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    url: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    note: Option<Option<String>>,
}

#[derive(Deserialize)]
struct EventRef {
    event_id: Uuid,
}

#[derive(Deserialize)]
struct RespondInvite {
    invite_id: Uuid,
    response: InviteStatus,
}

pub struct SessionHandler {
    services: Arc<Services>,
    caller: Caller,
}

impl SessionHandler {
    pub fn new(services: Arc<Services>, caller: Caller) -> Self {
        Self { services, caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn welcome(&self) -> Envelope {
        Envelope::new(
            Reply::ConnectionSuccess {
                message: "Connected to taqvim".to_string(),
                user: SessionUser {
                    id: self.caller.id,
                    email: self.caller.email.clone(),
                },
            },
            self.services.clock.now(),
        )
    }

    /// Process one message. Never fails: every problem becomes an `error` reply.
    pub async fn handle(&self, raw: &str) -> Outcome {
        let now = self.services.clock.now();
        let only = |reply: Reply| Outcome {
            reply: Envelope::new(reply, now),
            broadcast: None,
        };

        let message: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("Rejecting undecodable message: {}", e);
                return only(Reply::error("validation_failure", format!("Invalid JSON: {}", e)));
            }
        };
        let Some(action) = message.get("action").and_then(Value::as_str) else {
            return only(Reply::from(&CoreError::missing(vec!["action".to_string()])));
        };
        let Some(handler) = HANDLERS.get(action) else {
            warn!("Unknown action '{}' from {}", action, self.caller.id);
            return only(Reply::error(
                "unknown_action",
                format!("Unknown action: {}", action),
            ));
        };

        let data = message.get("data").filter(|d| d.is_object()).unwrap_or(&message);
        match handler(self, data, now) {
            Ok(handled) => {
                if !handled.schedules.is_empty() {
                    if let Err(e) = self.services.dispatcher.dispatch(handled.schedules).await {
                        warn!("Alert dispatch failed: {}", e);
                    }
                }
                Outcome {
                    reply: Envelope::new(handled.reply, now),
                    broadcast: handled.broadcast.map(|b| Envelope::new(b, now)),
                }
            }
            Err(e) => {
                match &e {
                    CoreError::Storage(_) | CoreError::Materialization(_) => {
                        error!("Action '{}' failed for {}: {}", action, self.caller.id, e)
                    }
                    _ => debug!("Action '{}' rejected: {}", action, e),
                }
                only(Reply::from(&e))
            }
        }
    }

    fn parse_text(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: ParseText = args(data, &["text"])?;
        let hint = request
            .language
            .as_deref()
            .map(str::parse::<Language>)
            .transpose()
            .map_err(CoreError::validation)?;

        let ctx = ExtractionContext::new(now, self.caller.timezone);
        let interpretation = self
            .services
            .interpreter
            .interpret(&request.text, hint, &ctx)
            .map_err(|e| CoreError::validation(e.to_string()))?;

        let drafts = &self.services.drafts;
        let raw = drafts.record_request(&self.caller, &request.text, now)?;
        let draft = drafts.create(&self.caller, &raw, &interpretation, now)?;
        info!(
            "Draft {} from {}: {} ({}, {:.2})",
            draft.id, self.caller.id, draft.intent, draft.language, draft.confidence
        );

        let preview = DraftPreview::new(
            &draft,
            interpretation.suggestions,
            self.services.interpreter.tables(),
        );
        Ok(Handled::reply(Reply::DraftPreview(Box::new(preview))))
    }

    fn edit_draft(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: EditDraft = args(data, &["draft_id", "edits"])?;
        let (draft, updated_fields) =
            self.services
                .drafts
                .edit(&self.caller, request.draft_id, request.edits, now)?;
        Ok(Handled::reply(Reply::DraftUpdated {
            draft_id: draft.id,
            updated_fields,
            extracted_data: draft.extracted,
        }))
    }

    fn confirm_draft(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: DraftRef = args(data, &["draft_id"])?;
        let confirmation = self.services.drafts.confirm(&self.caller, request.draft_id, now)?;
        let notification = Reply::notification(&confirmation.created.event);
        let schedules = confirmation.created.schedules.clone();
        Ok(Handled {
            reply: Reply::event_created(confirmation.created, Some(&confirmation.draft)),
            broadcast: Some(notification),
            schedules,
        })
    }

    fn cancel_draft(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: DraftRef = args(data, &["draft_id"])?;
        let draft = self.services.drafts.cancel(&self.caller, request.draft_id, now)?;
        Ok(Handled::reply(Reply::DraftCancelled { draft_id: draft.id }))
    }

    fn create_event(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: CreateEvent = args(data, &["title", "time_start", "time_end"])?;
        let new = NewEvent {
            title: request.title,
            all_day: request.all_day,
            time_start: self.timestamp("time_start", &request.time_start)?,
            time_end: self.timestamp("time_end", &request.time_end)?,
            repeat: request.repeat,
            url: request.url,
            note: request.note,
            invites: request.invites,
            alerts: request.alerts,
        };

        let created = self.services.events.create(&self.caller, new, now)?;
        let notification = Reply::notification(&created.event);
        let schedules = created.schedules.clone();
        Ok(Handled {
            reply: Reply::event_created(created, None),
            broadcast: Some(notification),
            schedules,
        })
    }

    fn get_events(&self, data: &Value, _now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: GetEvents = args(data, &[])?;
        let range = EventRange {
            start: request
                .start_date
                .as_deref()
                .map(|v| self.timestamp("start_date", v))
                .transpose()?,
            end: request
                .end_date
                .as_deref()
                .map(|v| self.range_end(v))
                .transpose()?,
        };

        let events = self.services.events.list(&self.caller, &range)?;
        Ok(Handled::reply(Reply::EventList {
            count: events.len(),
            events,
        }))
    }

    fn update_event(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: UpdateEvent = args(data, &["event_id"])?;
        let patch = EventPatch {
            title: request.title,
            all_day: request.all_day,
            time_start: request
                .time_start
                .as_deref()
                .map(|v| self.timestamp("time_start", v))
                .transpose()?,
            time_end: request
                .time_end
                .as_deref()
                .map(|v| self.timestamp("time_end", v))
                .transpose()?,
            repeat: request.repeat,
            url: request.url,
            note: request.note,
        };

        let (event, changed_fields) =
            self.services
                .events
                .update(&self.caller, request.event_id, patch, now)?;
        Ok(Handled::reply(Reply::EventUpdated {
            event,
            changed_fields,
        }))
    }

    fn delete_event(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: EventRef = args(data, &["event_id"])?;
        let event = self.services.events.cancel(&self.caller, request.event_id, now)?;
        Ok(Handled::reply(Reply::EventDeleted {
            event_id: event.id,
            title: event.title,
        }))
    }

    fn respond_invite(&self, data: &Value, now: DateTime<Utc>) -> CoreResult<Handled> {
        let request: RespondInvite = args(data, &["invite_id", "response"])?;
        let invite = self.services.events.respond_invite(
            &self.caller,
            request.invite_id,
            request.response,
            now,
        )?;
        Ok(Handled::reply(Reply::InviteResponded { invite }))
    }

    fn timestamp(&self, field: &str, value: &str) -> CoreResult<DateTime<FixedOffset>> {
        parse_timestamp(value, self.caller.timezone)
            .ok_or_else(|| CoreError::validation(format!("Invalid timestamp for {}: {}", field, value)))
    }

    // A bare end date covers that whole day.
    fn range_end(&self, value: &str) -> CoreResult<DateTime<FixedOffset>> {
        match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
            Ok(date) => {
                let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
                Ok(localize(date.and_time(last), self.caller.timezone))
            }
            Err(_) => self.timestamp("end_date", value),
        }
    }
}

/// Check `required` keys are present and non-empty, then decode the payload.
fn args<T: DeserializeOwned>(data: &Value, required: &[&str]) -> CoreResult<T> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| match data.get(**key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        })
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::missing(missing));
    }

    T::deserialize(data).map_err(|e| CoreError::validation(format!("Invalid request: {}", e)))
}

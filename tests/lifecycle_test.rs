use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Tashkent;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use uuid::Uuid;

use taqvim::models::AuditAction;
use taqvim::{
    Caller, CoreResult, Draft, DraftEdits, DraftLifecycleManager, DraftState, ExtractionContext,
    Interpreter, RuleTables, Store,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap()
}

fn caller() -> Caller {
    Caller {
        id: Uuid::new_v4(),
        email: "owner@example.com".to_string(),
        timezone: Tashkent,
    }
}

fn setup() -> (Arc<Store>, DraftLifecycleManager) {
    let store = Arc::new(Store::in_memory());
    let drafts = DraftLifecycleManager::new(Arc::clone(&store), Duration::hours(24));
    (store, drafts)
}

fn draft(drafts: &DraftLifecycleManager, caller: &Caller, text: &str, at: DateTime<Utc>) -> CoreResult<Draft> {
    let interpreter = Interpreter::new(RuleTables::builtin(), false, 1000);
    let interpretation = interpreter
        .interpret(text, None, &ExtractionContext::new(at, caller.timezone))
        .expect("prompt is valid");
    let request = drafts.record_request(caller, text, at)?;
    drafts.create(caller, &request, &interpretation, at)
}

#[test]
fn drafts_expire_a_day_after_creation() -> CoreResult<()> {
    let (_, drafts) = setup();
    let owner = caller();
    let created = draft(&drafts, &owner, "Ertaga soat 14:30 da meeting bor", now())?;

    assert_eq!(created.expires_at, now() + Duration::hours(24));
    assert_eq!(created.state(now()), DraftState::Pending);
    assert_eq!(created.state(created.expires_at), DraftState::Expired);
    Ok(())
}

#[test]
fn confirmation_keeps_only_well_formed_alerts() -> CoreResult<()> {
    let (store, drafts) = setup();
    let owner = caller();
    let pending = draft(&drafts, &owner, "Planning tomorrow at 11:00", now())?;

    let edits = DraftEdits {
        invite: Some(vec!["a@example.com".to_string(), "b@example.com".to_string()]),
        alert: Some(vec!["30m".to_string(), "soon".to_string()]),
        ..Default::default()
    };
    drafts.edit(&owner, pending.id, edits, now())?;

    let confirmation = drafts.confirm(&owner, pending.id, now())?;
    assert_eq!(confirmation.created.invites.len(), 2);
    assert_eq!(confirmation.created.alerts.len(), 1);
    assert_eq!(confirmation.created.schedules.len(), 1);

    let schedule = &confirmation.created.schedules[0];
    assert_eq!(schedule.offset_seconds, 1800);
    assert_eq!(
        schedule.fire_at,
        confirmation.created.event.time_start - Duration::minutes(30)
    );

    let (invites, alerts) = store.read(|t| {
        let event_id = confirmation.created.event.id;
        (t.invites_for(event_id).count(), t.alerts_for(event_id).count())
    });
    assert_eq!((invites, alerts), (2, 1));
    Ok(())
}

#[test]
fn second_confirmation_is_refused() -> CoreResult<()> {
    let (store, drafts) = setup();
    let owner = caller();
    let pending = draft(&drafts, &owner, "Planning tomorrow at 11:00", now())?;

    drafts.confirm(&owner, pending.id, now())?;
    let err = drafts.confirm(&owner, pending.id, now()).unwrap_err();

    assert_eq!(err.code(), "not_found_or_expired");
    assert_eq!(store.read(|t| t.events().count()), 1);
    Ok(())
}

#[test]
fn all_day_bounds_cover_the_local_day() -> CoreResult<()> {
    let (_, drafts) = setup();
    let owner = caller();
    let pending = draft(&drafts, &owner, "Offsite", now())?;
    let edits = DraftEdits {
        all_day: Some(true),
        time_start: Some("2025-01-10T09:00".to_string()),
        time_end: Some("2025-01-10T10:00".to_string()),
        ..Default::default()
    };
    drafts.edit(&owner, pending.id, edits, now())?;

    let event = drafts.confirm(&owner, pending.id, now())?.created.event;
    let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
    assert_eq!(event.time_start.naive_local(), day.and_hms_opt(0, 0, 0).unwrap());
    assert_eq!(
        event.time_end.naive_local(),
        day.and_hms_micro_opt(23, 59, 59, 999_999).unwrap()
    );
    Ok(())
}

#[test]
fn sweep_removes_only_expired_unconfirmed_drafts() -> CoreResult<()> {
    let (store, drafts) = setup();
    let owner = caller();
    let stale = draft(&drafts, &owner, "Old idea", now())?;
    let confirmed = draft(&drafts, &owner, "Planning tomorrow at 11:00", now())?;
    drafts.confirm(&owner, confirmed.id, now())?;
    let fresh = draft(&drafts, &owner, "New idea", now() + Duration::hours(20))?;

    let later = now() + Duration::hours(30);
    assert_eq!(drafts.sweep(later), 1);
    assert_eq!(drafts.sweep(later), 0);

    let remaining = store.read(|t| {
        (
            t.draft(stale.id).is_some(),
            t.draft(confirmed.id).is_some(),
            t.draft(fresh.id).is_some(),
        )
    });
    assert_eq!(remaining, (false, true, true));

    let entry = store.read(|t| t.audit().last().cloned()).expect("sweep is audited");
    assert_eq!(entry.action, AuditAction::Delete);
    assert_eq!(entry.actor, owner.id);
    assert_eq!(entry.subject_id, stale.id);
    assert_eq!(entry.changes["reason"], "expired");
    Ok(())
}

#[test]
fn a_draft_expiring_exactly_now_is_not_swept_yet() -> CoreResult<()> {
    let (_, drafts) = setup();
    let owner = caller();
    let pending = draft(&drafts, &owner, "Old idea", now())?;

    assert_eq!(drafts.sweep(pending.expires_at), 0);
    assert_eq!(drafts.sweep(pending.expires_at + Duration::seconds(1)), 1);
    Ok(())
}

#[test]
fn every_step_is_audited() -> CoreResult<()> {
    let (store, drafts) = setup();
    let owner = caller();
    let pending = draft(&drafts, &owner, "Review tomorrow at 16:00 with a@example.com", now())?;
    drafts.confirm(&owner, pending.id, now())?;

    let trail: Vec<(AuditAction, String)> = store.read(|t| {
        t.audit()
            .map(|e| (e.action, e.subject_type.clone()))
            .collect()
    });
    assert_eq!(
        trail,
        vec![
            (AuditAction::Create, "UserRequest".to_string()),
            (AuditAction::Parse, "UserRequest".to_string()),
            (AuditAction::Create, "Draft".to_string()),
            (AuditAction::Create, "Event".to_string()),
            (AuditAction::Invite, "Invite".to_string()),
        ]
    );
    Ok(())
}

//! In-memory record store with all-or-nothing transactions, persisted as a
//! snapshot of the live records plus an append-only history journal.
//!
//! Drafts, events, invites and alerts are live records. `Store::transaction`
//! hands the closure a working copy of them and swaps it in only when the
//! closure returns `Ok` and the disk write succeeded, so a failure part-way
//! through leaves nothing behind. Requests and audit entries only ever grow:
//! a transaction collects new ones on the side, and commit appends them to the
//! shared history and to `history.jsonl` instead of rewriting the snapshot.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Alert, AuditEntry, CalendarEvent, Draft, Invite, RawRequest};

const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.jsonl";
// Maximum allowed size for the live snapshot (10MB)
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Live {
    drafts: BTreeMap<Uuid, Draft>,
    events: BTreeMap<Uuid, CalendarEvent>,
    invites: BTreeMap<Uuid, Invite>,
    alerts: BTreeMap<Uuid, Alert>,
}

#[derive(Debug, Default, Clone)]
struct History {
    requests: Vec<RawRequest>,
    audit: Vec<AuditEntry>,
}

/// One line of `history.jsonl`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HistoryRecord {
    Request(RawRequest),
    Audit(AuditEntry),
}

#[derive(Debug, Default)]
pub struct Tables {
    live: Live,
    history: Arc<History>,
    new_requests: Vec<RawRequest>,
    new_audit: Vec<AuditEntry>,
    live_changed: bool,
}

impl Tables {
    pub fn insert_request(&mut self, request: RawRequest) {
        self.new_requests.push(request);
    }

    pub fn request(&self, id: Uuid) -> Option<&RawRequest> {
        self.history
            .requests
            .iter()
            .chain(&self.new_requests)
            .find(|r| r.id == id)
    }

    pub fn insert_draft(&mut self, draft: Draft) {
        self.live_changed = true;
        self.live.drafts.insert(draft.id, draft);
    }

    pub fn draft(&self, id: Uuid) -> Option<&Draft> {
        self.live.drafts.get(&id)
    }

    pub fn draft_mut(&mut self, id: Uuid) -> Option<&mut Draft> {
        self.live_changed = true;
        self.live.drafts.get_mut(&id)
    }

    pub fn remove_draft(&mut self, id: Uuid) -> Option<Draft> {
        self.live_changed = true;
        self.live.drafts.remove(&id)
    }

    pub fn drafts(&self) -> impl Iterator<Item = &Draft> {
        self.live.drafts.values()
    }

    pub fn insert_event(&mut self, event: CalendarEvent) {
        self.live_changed = true;
        self.live.events.insert(event.id, event);
    }

    pub fn event(&self, id: Uuid) -> Option<&CalendarEvent> {
        self.live.events.get(&id)
    }

    pub fn event_mut(&mut self, id: Uuid) -> Option<&mut CalendarEvent> {
        self.live_changed = true;
        self.live.events.get_mut(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &CalendarEvent> {
        self.live.events.values()
    }

    /// Fails when the event already has an invite for the same address.
    pub fn insert_invite(&mut self, invite: Invite) -> Result<(), StoreError> {
        let duplicate = self
            .live
            .invites
            .values()
            .any(|i| i.event_id == invite.event_id && i.email.eq_ignore_ascii_case(&invite.email));
        if duplicate {
            return Err(StoreError::DuplicateInvite {
                event_id: invite.event_id,
                email: invite.email,
            });
        }
        self.live_changed = true;
        self.live.invites.insert(invite.id, invite);
        Ok(())
    }

    pub fn invite(&self, id: Uuid) -> Option<&Invite> {
        self.live.invites.get(&id)
    }

    pub fn invite_mut(&mut self, id: Uuid) -> Option<&mut Invite> {
        self.live_changed = true;
        self.live.invites.get_mut(&id)
    }

    pub fn invites_for(&self, event_id: Uuid) -> impl Iterator<Item = &Invite> {
        self.live.invites.values().filter(move |i| i.event_id == event_id)
    }

    pub fn invites(&self) -> impl Iterator<Item = &Invite> {
        self.live.invites.values()
    }

    pub fn insert_alert(&mut self, alert: Alert) {
        self.live_changed = true;
        self.live.alerts.insert(alert.id, alert);
    }

    pub fn alerts_for(&self, event_id: Uuid) -> impl Iterator<Item = &Alert> {
        self.live.alerts.values().filter(move |a| a.event_id == event_id)
    }

    /// The trail is append-only; there is no way to edit or drop an entry.
    pub fn append_audit(&mut self, entry: AuditEntry) {
        self.new_audit.push(entry);
    }

    /// Every audit entry, oldest first.
    pub fn audit(&self) -> impl DoubleEndedIterator<Item = &AuditEntry> {
        self.history.audit.iter().chain(&self.new_audit)
    }
}

pub struct Store {
    tables: Mutex<Tables>,
    dir: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            dir: None,
        }
    }

    /// Load `state.json` and `history.jsonl` from `state_dir` (if present) and
    /// keep both up to date.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(state_dir)?;

        let state_path = state_dir.join(STATE_FILE);
        let live = if state_path.exists() {
            // Check file size before loading
            let metadata = fs::metadata(&state_path)?;
            if metadata.len() > MAX_FILE_SIZE {
                return Err(StoreError::TooLarge {
                    limit: MAX_FILE_SIZE,
                });
            }
            let reader = BufReader::new(File::open(&state_path)?);
            serde_json::from_reader(reader)?
        } else {
            Live::default()
        };

        let history_path = state_dir.join(HISTORY_FILE);
        let mut history = History::default();
        if history_path.exists() {
            let reader = BufReader::new(File::open(&history_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line)? {
                    HistoryRecord::Request(request) => history.requests.push(request),
                    HistoryRecord::Audit(entry) => history.audit.push(entry),
                }
            }
        }

        info!(
            "Loaded {} drafts, {} events and {} audit entries from {}",
            live.drafts.len(),
            live.events.len(),
            history.audit.len(),
            state_dir.display()
        );

        Ok(Self {
            tables: Mutex::new(Tables {
                live,
                history: Arc::new(history),
                ..Tables::default()
            }),
            dir: Some(state_dir.to_path_buf()),
        })
    }

    // Transactions never touch the guarded tables before commit, so a panic
    // inside one leaves them intact and the poison flag can be ignored.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.lock())
    }

    /// Run `f` against a working copy; commit only if it returns `Ok`.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&mut Tables) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.lock();
        let mut working = Tables {
            live: guard.live.clone(),
            history: Arc::clone(&guard.history),
            ..Tables::default()
        };
        let value = f(&mut working)?;

        let Tables {
            live,
            history,
            new_requests,
            new_audit,
            live_changed,
        } = working;
        drop(history);

        if let Some(dir) = &self.dir {
            persist(dir, &live, live_changed, &new_requests, &new_audit)?;
        }

        if live_changed {
            guard.live = live;
        }
        let history = Arc::make_mut(&mut guard.history);
        history.requests.extend(new_requests);
        history.audit.extend(new_audit);
        Ok(value)
    }
}

/// Append the new history, then replace the snapshot. A failed snapshot
/// truncates the journal back so disk and memory stay in step.
fn persist(
    dir: &Path,
    live: &Live,
    live_changed: bool,
    requests: &[RawRequest],
    audit: &[AuditEntry],
) -> Result<(), StoreError> {
    let history_path = dir.join(HISTORY_FILE);
    let journal_len = append_history(&history_path, requests, audit)?;

    if live_changed {
        if let Err(e) = write_snapshot(&dir.join(STATE_FILE), live) {
            error!("Snapshot failed, rolling back history journal: {}", e);
            if let Some(len) = journal_len {
                OpenOptions::new().write(true).open(&history_path)?.set_len(len)?;
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Returns the journal length before the append, or `None` when there was
/// nothing to append.
fn append_history(
    path: &Path,
    requests: &[RawRequest],
    audit: &[AuditEntry],
) -> Result<Option<u64>, StoreError> {
    if requests.is_empty() && audit.is_empty() {
        return Ok(None);
    }

    let mut buffer = Vec::new();
    let records = requests
        .iter()
        .cloned()
        .map(HistoryRecord::Request)
        .chain(audit.iter().cloned().map(HistoryRecord::Audit));
    for record in records {
        serde_json::to_writer(&mut buffer, &record)?;
        buffer.push(b'\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let before = file.metadata()?.len();
    file.write_all(&buffer)?;
    file.flush()?;
    Ok(Some(before))
}

fn write_snapshot(path: &Path, live: &Live) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(live)?;
    if bytes.len() as u64 > MAX_FILE_SIZE {
        error!(
            "Snapshot of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_FILE_SIZE
        );
        return Err(StoreError::TooLarge {
            limit: MAX_FILE_SIZE,
        });
    }

    let tmp = path.with_extension("json.tmp");
    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!("Snapshot written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::models::{AuditAction, InviteStatus};
    use chrono::Utc;
    use serde_json::json;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::tempdir;

    fn invite(event_id: Uuid, email: &str) -> Invite {
        Invite {
            id: Uuid::new_v4(),
            event_id,
            email: email.to_string(),
            status: InviteStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    fn request(text: &str) -> RawRequest {
        RawRequest {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    fn audit_entry(subject_id: Uuid) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor: Uuid::new_v4(),
            event_id: None,
            action: AuditAction::Create,
            subject_type: "UserRequest".to_string(),
            subject_id,
            changes: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = Store::in_memory();
        let event_id = Uuid::new_v4();

        let result: Result<(), CoreError> = store.transaction(|tx| {
            tx.append_audit(audit_entry(event_id));
            tx.insert_invite(invite(event_id, "a@example.com"))?;
            tx.insert_invite(invite(event_id, "A@example.com"))?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(CoreError::Storage(StoreError::DuplicateInvite { .. }))
        ));
        assert_eq!(store.read(|t| t.invites().count()), 0);
        assert_eq!(store.read(|t| t.audit().count()), 0);
    }

    #[test]
    fn same_address_on_different_events_is_fine() -> Result<(), StoreError> {
        let store = Store::in_memory();
        store.transaction(|tx| {
            tx.insert_invite(invite(Uuid::new_v4(), "a@example.com"))?;
            tx.insert_invite(invite(Uuid::new_v4(), "a@example.com"))
        })?;
        assert_eq!(store.read(|t| t.invites().count()), 2);
        Ok(())
    }

    #[test]
    fn a_panicking_transaction_does_not_wedge_the_store() -> Result<(), StoreError> {
        let store = Store::in_memory();
        let event_id = Uuid::new_v4();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), StoreError> = store.transaction(|tx| {
                tx.insert_invite(invite(event_id, "a@example.com"))?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());

        assert_eq!(store.read(|t| t.invites().count()), 0);
        store.transaction(|tx| tx.insert_invite(invite(event_id, "a@example.com")))?;
        assert_eq!(store.read(|t| t.invites_for(event_id).count()), 1);
        Ok(())
    }

    #[test]
    fn snapshot_and_history_survive_reopen() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let original = request("ertaga 10:00 standup");
        let event_id = Uuid::new_v4();
        {
            let store = Store::open(dir.path())?;
            store.transaction(|tx| {
                tx.insert_request(original.clone());
                tx.append_audit(audit_entry(original.id));
                Ok::<_, StoreError>(())
            })?;
            store.transaction(|tx| tx.insert_invite(invite(event_id, "a@example.com")))?;
        }

        let reopened = Store::open(dir.path())?;
        let text = reopened.read(|t| t.request(original.id).map(|r| r.text.clone()));
        assert_eq!(text.as_deref(), Some("ertaga 10:00 standup"));
        assert_eq!(reopened.read(|t| t.audit().count()), 1);
        assert_eq!(reopened.read(|t| t.invites_for(event_id).count()), 1);
        Ok(())
    }

    #[test]
    fn history_only_commits_leave_the_snapshot_alone() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let store = Store::open(dir.path())?;
        store.transaction(|tx| {
            tx.insert_request(request("salom"));
            Ok::<_, StoreError>(())
        })?;

        assert!(!dir.path().join(STATE_FILE).exists());
        assert!(dir.path().join(HISTORY_FILE).exists());
        Ok(())
    }

    #[test]
    fn an_oversized_snapshot_fails_the_commit() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let store = Store::open(dir.path())?;
        let mut huge = invite(Uuid::new_v4(), "a@example.com");
        huge.email = "x".repeat(MAX_FILE_SIZE as usize);

        let result = store.transaction(|tx| {
            tx.append_audit(audit_entry(huge.id));
            tx.insert_invite(huge.clone())
        });

        assert!(matches!(result, Err(StoreError::TooLarge { .. })));
        assert_eq!(store.read(|t| (t.invites().count(), t.audit().count())), (0, 0));
        assert_eq!(fs::metadata(dir.path().join(HISTORY_FILE))?.len(), 0);

        // Nothing oversized reached disk, so the directory still opens.
        assert_eq!(Store::open(dir.path())?.read(|t| t.invites().count()), 0);
        Ok(())
    }

    #[test]
    fn oversized_snapshot_is_refused() -> Result<(), StoreError> {
        let dir = tempdir()?;
        let file = File::create(dir.path().join(STATE_FILE))?;
        file.set_len(MAX_FILE_SIZE + 1)?;

        assert!(matches!(
            Store::open(dir.path()),
            Err(StoreError::TooLarge { .. })
        ));
        Ok(())
    }
}

//! In-memory public store.
//!
//! Staged changes are kept apart from committed state until `save`, so
//! callers observe the same visibility rules as the native store.

use super::{
    LiveList, LiveReminder, PublicStore, ReminderDraft, ReminderPatch, ReminderPredicate,
    StoreError, StoreResult,
};
use crate::model::id::normalize_identifier;
use log::debug;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum StagedChange {
    Create(LiveReminder),
    Update(String, ReminderPatch),
    Delete(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    lists: Vec<LiveList>,
    reminders: Vec<LiveReminder>,
    staged: Vec<StagedChange>,
    saves: usize,
}

/// Public store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a committed list.
    pub fn insert_list(&self, list: LiveList) {
        self.state().lists.push(list);
    }

    /// Adds a committed reminder.
    pub fn insert_reminder(&self, mut reminder: LiveReminder) {
        reminder.id = normalize_identifier(&reminder.id);
        reminder.list_id = reminder.list_id.map(|id| normalize_identifier(&id));
        self.state().reminders.push(reminder);
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.state().saves
    }

    /// Number of changes waiting for `save`.
    pub fn staged_len(&self) -> usize {
        self.state().staged.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn list(&self, id: &str) -> Option<&LiveList> {
        let id = normalize_identifier(id);
        self.lists.iter().find(|list| list.id == id)
    }

    fn reminder(&self, id: &str) -> Option<&LiveReminder> {
        let id = normalize_identifier(id);
        self.reminders.iter().find(|reminder| reminder.id == id)
    }
}

impl PublicStore for MemoryStore {
    fn fetch_reminder(&self, id: &str) -> StoreResult<Option<LiveReminder>> {
        Ok(self.state().reminder(id).cloned())
    }

    fn fetch_reminders(&self, predicate: &ReminderPredicate) -> StoreResult<Vec<LiveReminder>> {
        Ok(self
            .state()
            .reminders
            .iter()
            .filter(|reminder| predicate.matches(reminder))
            .cloned()
            .collect())
    }

    fn fetch_lists(&self) -> StoreResult<Vec<LiveList>> {
        Ok(self.state().lists.clone())
    }

    fn fetch_list(&self, id: &str) -> StoreResult<Option<LiveList>> {
        Ok(self.state().list(id).cloned())
    }

    fn create_reminder(&self, draft: &ReminderDraft) -> StoreResult<LiveReminder> {
        let mut state = self.state();
        let list = state
            .list(&draft.list_id)
            .ok_or_else(|| StoreError::ListNotFound(draft.list_id.clone()))?;
        if !list.writable {
            return Err(StoreError::ReadOnlyList(list.id.clone()));
        }
        let reminder = LiveReminder {
            id: Uuid::new_v4().hyphenated().to_string().to_ascii_uppercase(),
            title: Some(draft.title.clone()),
            notes: draft.notes.clone(),
            completed: false,
            priority: draft.priority.unwrap_or(0),
            due_date: draft.due_date,
            list_id: Some(list.id.clone()),
        };
        state.staged.push(StagedChange::Create(reminder.clone()));
        Ok(reminder)
    }

    fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<LiveReminder> {
        let mut state = self.state();
        let mut updated = state
            .reminder(id)
            .cloned()
            .ok_or_else(|| StoreError::ReminderNotFound(id.to_string()))?;
        patch.apply(&mut updated);
        state
            .staged
            .push(StagedChange::Update(updated.id.clone(), patch.clone()));
        Ok(updated)
    }

    fn delete_reminder(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state();
        let existing = state
            .reminder(id)
            .map(|reminder| reminder.id.clone())
            .ok_or_else(|| StoreError::ReminderNotFound(id.to_string()))?;
        state.staged.push(StagedChange::Delete(existing));
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        let mut state = self.state();
        let staged = std::mem::take(&mut state.staged);
        let applied = staged.len();
        for change in staged {
            match change {
                StagedChange::Create(reminder) => state.reminders.push(reminder),
                StagedChange::Update(id, patch) => {
                    if let Some(reminder) = state.reminders.iter_mut().find(|r| r.id == id) {
                        patch.apply(reminder);
                    }
                }
                StagedChange::Delete(id) => state.reminders.retain(|reminder| reminder.id != id),
            }
        }
        state.saves += 1;
        debug!("event=store_save module=store status=ok backend=memory applied={applied}");
        Ok(())
    }
}

//! Stable public API boundary.
//!
//! # Responsibility
//! - Define the read/write contract the core consumes from the stable API.
//! - Provide an in-memory implementation and a bridged native one.
//!
//! # Invariants
//! - Create/update/delete are staged and become visible only after `save`.
//! - Identifiers returned by stores are normalized.
//! - Undocumented methods are never called on objects from this surface.

use crate::bridge::BridgeError;
use crate::error::ErrorKind;
use crate::model::id::{normalize_identifier, same_identifier};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod bridged;
pub mod memory;

pub type StoreResult<T> = Result<T, StoreError>;

/// Public store failures.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No reminder with this id.
    ReminderNotFound(String),
    /// No list with this id or title.
    ListNotFound(String),
    /// List exists but rejects modifications.
    ReadOnlyList(String),
    /// Native call on the stable surface failed.
    Bridge(BridgeError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReminderNotFound(_) | Self::ListNotFound(_) => ErrorKind::NotFound,
            Self::ReadOnlyList(_) => ErrorKind::StoreError,
            Self::Bridge(err) => err.kind(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReminderNotFound(id) => write!(f, "reminder not found: {id}"),
            Self::ListNotFound(id) => write!(f, "list not found: {id}"),
            Self::ReadOnlyList(id) => write!(f, "list is read-only: {id}"),
            Self::Bridge(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bridge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BridgeError> for StoreError {
    fn from(value: BridgeError) -> Self {
        Self::Bridge(value)
    }
}

/// Reminder as seen through the stable API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReminder {
    pub id: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub completed: bool,
    pub priority: i64,
    /// Seconds since the Unix epoch.
    pub due_date: Option<f64>,
    pub list_id: Option<String>,
}

impl LiveReminder {
    pub fn new(id: &str, title: &str, list_id: &str) -> Self {
        Self {
            id: normalize_identifier(id),
            title: Some(title.to_string()),
            notes: None,
            completed: false,
            priority: 0,
            due_date: None,
            list_id: Some(normalize_identifier(list_id)),
        }
    }
}

/// Reminder list as seen through the stable API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveList {
    pub id: String,
    pub title: String,
    pub writable: bool,
}

impl LiveList {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: normalize_identifier(id),
            title: title.to_string(),
            writable: true,
        }
    }
}

/// Live object handed to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveObject {
    Reminder(LiveReminder),
    List(LiveList),
}

/// Fields of a reminder to create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReminderDraft {
    pub title: String,
    pub list_id: String,
    pub notes: Option<String>,
    pub priority: Option<i64>,
    pub due_date: Option<f64>,
}

impl ReminderDraft {
    pub fn new(title: impl Into<String>, list_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            list_id: list_id.into(),
            ..Self::default()
        }
    }
}

/// Fields to change on an existing reminder; `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<i64>,
    pub due_date: Option<f64>,
}

impl ReminderPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn apply(&self, reminder: &mut LiveReminder) {
        if let Some(title) = &self.title {
            reminder.title = Some(title.clone());
        }
        if let Some(notes) = &self.notes {
            reminder.notes = Some(notes.clone());
        }
        if let Some(completed) = self.completed {
            reminder.completed = completed;
        }
        if let Some(priority) = self.priority {
            reminder.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            reminder.due_date = Some(due_date);
        }
    }
}

/// Filter for bulk reminder fetches.
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderPredicate {
    All,
    InLists(Vec<String>),
}

impl ReminderPredicate {
    pub fn matches(&self, reminder: &LiveReminder) -> bool {
        match self {
            Self::All => true,
            Self::InLists(lists) => reminder.list_id.as_deref().is_some_and(|list_id| {
                lists.iter().any(|wanted| same_identifier(wanted, list_id))
            }),
        }
    }
}

/// Read/write contract of the stable public API.
pub trait PublicStore {
    fn fetch_reminder(&self, id: &str) -> StoreResult<Option<LiveReminder>>;
    fn fetch_reminders(&self, predicate: &ReminderPredicate) -> StoreResult<Vec<LiveReminder>>;
    fn fetch_lists(&self) -> StoreResult<Vec<LiveList>>;
    fn fetch_list(&self, id: &str) -> StoreResult<Option<LiveList>>;
    /// Stages a new reminder; it is visible to fetches after `save`.
    fn create_reminder(&self, draft: &ReminderDraft) -> StoreResult<LiveReminder>;
    fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<LiveReminder>;
    fn delete_reminder(&self, id: &str) -> StoreResult<()>;
    /// Commits every staged change.
    fn save(&self) -> StoreResult<()>;
}

impl<T: PublicStore + ?Sized> PublicStore for &T {
    fn fetch_reminder(&self, id: &str) -> StoreResult<Option<LiveReminder>> {
        (**self).fetch_reminder(id)
    }

    fn fetch_reminders(&self, predicate: &ReminderPredicate) -> StoreResult<Vec<LiveReminder>> {
        (**self).fetch_reminders(predicate)
    }

    fn fetch_lists(&self) -> StoreResult<Vec<LiveList>> {
        (**self).fetch_lists()
    }

    fn fetch_list(&self, id: &str) -> StoreResult<Option<LiveList>> {
        (**self).fetch_list(id)
    }

    fn create_reminder(&self, draft: &ReminderDraft) -> StoreResult<LiveReminder> {
        (**self).create_reminder(draft)
    }

    fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<LiveReminder> {
        (**self).update_reminder(id, patch)
    }

    fn delete_reminder(&self, id: &str) -> StoreResult<()> {
        (**self).delete_reminder(id)
    }

    fn save(&self) -> StoreResult<()> {
        (**self).save()
    }
}

impl<T: PublicStore + ?Sized> PublicStore for Arc<T> {
    fn fetch_reminder(&self, id: &str) -> StoreResult<Option<LiveReminder>> {
        (**self).fetch_reminder(id)
    }

    fn fetch_reminders(&self, predicate: &ReminderPredicate) -> StoreResult<Vec<LiveReminder>> {
        (**self).fetch_reminders(predicate)
    }

    fn fetch_lists(&self) -> StoreResult<Vec<LiveList>> {
        (**self).fetch_lists()
    }

    fn fetch_list(&self, id: &str) -> StoreResult<Option<LiveList>> {
        (**self).fetch_list(id)
    }

    fn create_reminder(&self, draft: &ReminderDraft) -> StoreResult<LiveReminder> {
        (**self).create_reminder(draft)
    }

    fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<LiveReminder> {
        (**self).update_reminder(id, patch)
    }

    fn delete_reminder(&self, id: &str) -> StoreResult<()> {
        (**self).delete_reminder(id)
    }

    fn save(&self) -> StoreResult<()> {
        (**self).save()
    }
}

/// Finds a list by identifier, falling back to a case-insensitive title match.
pub fn resolve_list<S: PublicStore + ?Sized>(store: &S, id_or_title: &str) -> StoreResult<LiveList> {
    if let Some(list) = store.fetch_list(id_or_title)? {
        return Ok(list);
    }
    let wanted = id_or_title.trim();
    store
        .fetch_lists()?
        .into_iter()
        .find(|list| list.title.trim().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| StoreError::ListNotFound(id_or_title.to_string()))
}

/// Live objects for reconciliation: all lists plus reminders matching `predicate`.
pub fn live_objects<S: PublicStore + ?Sized>(
    store: &S,
    predicate: &ReminderPredicate,
) -> StoreResult<Vec<LiveObject>> {
    let mut objects: Vec<LiveObject> = store.fetch_lists()?.into_iter().map(LiveObject::List).collect();
    objects.extend(
        store
            .fetch_reminders(predicate)?
            .into_iter()
            .map(LiveObject::Reminder),
    );
    Ok(objects)
}

//! Reconciled domain entities.
//!
//! # Responsibility
//! - Describe tasks, sections and containers as plain value objects.
//!
//! # Invariants
//! - `id` is the public-API identifier whenever a live object exists; the
//!   mirror identifier is used only for mirror-only entities and is tagged
//!   with `IdSource::Mirror`.

use serde::Serialize;

/// Which source supplied an entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Stable public API.
    Public,
    /// Relational mirror only; the object has not synced to the public view.
    Mirror,
}

/// Sharing state of a container as recorded in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingStatus {
    NotShared,
    /// Shared by the current account.
    SharedByOwner,
    /// Shared with the current account by someone else.
    SharedWithMe,
    /// Mirror has no row for the container.
    Unknown,
}

impl SharingStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::NotShared,
            1 => Self::SharedByOwner,
            2 => Self::SharedWithMe,
            _ => Self::Unknown,
        }
    }

    pub fn is_shared(self) -> bool {
        matches!(self, Self::SharedByOwner | Self::SharedWithMe)
    }
}

/// Task with its nested subtasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub id_source: IdSource,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub completed: bool,
    pub priority: i64,
    /// Seconds since the Unix epoch.
    pub due_date: Option<f64>,
    pub list_id: Option<String>,
    pub parent_id: Option<String>,
    /// `None` means ungrouped.
    pub section_id: Option<String>,
    pub display_order: Option<i64>,
    pub children: Vec<Task>,
}

impl Task {
    /// Depth-first search for `id` in this subtree.
    pub fn find(&self, id: &str) -> Option<&Task> {
        let mut pending = vec![self];
        while let Some(task) = pending.pop() {
            if task.id == id {
                return Some(task);
            }
            pending.extend(task.children.iter().rev());
        }
        None
    }

    /// Number of tasks in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        let mut pending = vec![self];
        let mut count = 0;
        while let Some(task) = pending.pop() {
            count += 1;
            pending.extend(task.children.iter());
        }
        count
    }

    pub fn is_ungrouped(&self) -> bool {
        self.section_id.is_none()
    }
}

/// Grouping section inside a list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub id: String,
    pub display_name: String,
    pub list_id: Option<String>,
    /// Member task identifiers in membership order.
    pub member_ids: Vec<String>,
}

/// Reminder list with its sharing summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    pub id: String,
    pub id_source: IdSource,
    pub title: Option<String>,
    /// `None` when only the mirror knows the container.
    pub writable: Option<bool>,
    pub sharing_status: SharingStatus,
    pub section_ids: Vec<String>,
}

/// Any reconciled entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEntity {
    Task(Task),
    Section(Section),
    Container(Container),
}

impl DomainEntity {
    pub fn id(&self) -> &str {
        match self {
            Self::Task(task) => &task.id,
            Self::Section(section) => &section.id,
            Self::Container(container) => &container.id,
        }
    }
}

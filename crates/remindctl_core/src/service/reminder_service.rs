//! Reminder use-case service.
//!
//! # Responsibility
//! - Add reminders to a list or directly into a section.
//! - Move reminders between lists, render the task tree and report
//!   undocumented-API capabilities.
//!
//! # Invariants
//! - Adding into a section probes the membership symbols before creating
//!   anything; a later transaction failure never rolls back the created
//!   reminder and is reported as partial success.
//! - Moving a reminder that still has subtasks is refused.

use super::section_service::membership_operation;
use super::{required_text, ServiceError, ServiceResult};
use crate::bridge::signature::symbol;
use crate::bridge::symbol::Capability;
use crate::error::ErrorKind;
use crate::graph::builder::{Operation, OperationKind};
use crate::graph::commit::MutationResult;
use crate::graph::engine::MutationEngine;
use crate::graph::MutationError;
use crate::mirror::{MirrorReader, MirrorSelector};
use crate::model::id::{normalize_identifier, same_identifier};
use crate::model::membership::Membership;
use crate::reconcile::{reconcile, Reconciled};
use crate::store::{
    live_objects, resolve_list, LiveReminder, PublicStore, ReminderDraft, ReminderPredicate,
    StoreError,
};
use log::{info, warn};
use serde::Serialize;

/// Where a new reminder goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderTarget {
    /// List identifier or title.
    List(String),
    /// Section identifier; the list is taken from the mirror.
    Section(String),
}

/// State of the section membership requested by `add`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MembershipStatus {
    NotRequested,
    Confirmed,
    /// Reminder exists but the membership transaction failed.
    NotConfirmed { kind: ErrorKind, message: String },
}

/// Result of `add`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOutcome {
    pub reminder: LiveReminder,
    pub section_id: Option<String>,
    pub membership: MembershipStatus,
}

impl AddOutcome {
    pub fn is_partial(&self) -> bool {
        matches!(self.membership, MembershipStatus::NotConfirmed { .. })
    }
}

/// Reminder service facade.
pub struct ReminderService<'a, S: PublicStore> {
    store: S,
    engine: MutationEngine<'a>,
    mirror: MirrorReader,
}

impl<'a, S: PublicStore> ReminderService<'a, S> {
    pub fn new(store: S, engine: MutationEngine<'a>, mirror: MirrorReader) -> Self {
        Self {
            store,
            engine,
            mirror,
        }
    }

    /// Creates `title` in a list, or in a section of the section's list.
    pub fn add(&self, title: &str, target: &ReminderTarget) -> ServiceResult<AddOutcome> {
        let title = required_text("title", title)?;
        match target {
            ReminderTarget::List(list) => {
                let list = resolve_list(&self.store, &required_text("list id", list)?)?;
                let reminder = self.create(&title, &list.id)?;
                info!(
                    "event=reminder_add module=service status=ok id={} list={}",
                    reminder.id, list.id
                );
                Ok(AddOutcome {
                    reminder,
                    section_id: None,
                    membership: MembershipStatus::NotRequested,
                })
            }
            ReminderTarget::Section(section_id) => self.add_to_section(&title, section_id),
        }
    }

    fn add_to_section(&self, title: &str, section_id: &str) -> ServiceResult<AddOutcome> {
        let section_id = normalize_identifier(&required_text("section id", section_id)?);
        let snapshot = self.mirror.read_snapshot(MirrorSelector::All);
        let list_id = snapshot
            .section(&section_id)
            .ok_or_else(|| ServiceError::NotFound(format!("section {section_id}")))?
            .list_id
            .clone()
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("section {section_id} has no list"))
            })?;
        let list = self
            .store
            .fetch_list(&list_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("list {list_id}")))?;

        // One stand-in entry: the new reminder's id is not known yet.
        let required: Vec<_> = Operation::AssignSection {
            list_id: list.id.clone(),
            memberships: vec![Membership::new(&list.id, &section_id, 0.0)],
        }
        .required_symbols()
        .into_iter()
        .map(symbol)
        .collect();
        let missing = self.engine.resolver().missing(&required);
        if !missing.is_empty() {
            warn!(
                "event=reminder_add module=service status=aborted section={} missing={}",
                section_id,
                missing.len()
            );
            return Err(MutationError::CapabilityUnavailable {
                operation: OperationKind::AssignSection,
                missing,
            }
            .into());
        }

        let reminder = self.create(title, &list.id)?;

        let assigned = membership_operation(&snapshot, &list.id, &reminder.id, Some(&section_id))
            .and_then(|operation| self.engine.run(&operation).map_err(ServiceError::from));
        let membership = match assigned {
            Ok(_) => MembershipStatus::Confirmed,
            Err(err) => {
                warn!(
                    "event=reminder_add module=service status=error id={} section={} error_code={}",
                    reminder.id,
                    section_id,
                    err.kind()
                );
                MembershipStatus::NotConfirmed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        info!(
            "event=reminder_add module=service status=ok id={} section={} partial={}",
            reminder.id,
            section_id,
            matches!(membership, MembershipStatus::NotConfirmed { .. })
        );
        Ok(AddOutcome {
            reminder,
            section_id: Some(section_id),
            membership,
        })
    }

    fn create(&self, title: &str, list_id: &str) -> ServiceResult<LiveReminder> {
        let reminder = self
            .store
            .create_reminder(&ReminderDraft::new(title, list_id))?;
        self.store.save()?;
        Ok(reminder)
    }

    /// Moves a reminder to another list; the copy gets a new identity.
    pub fn move_to_list(&self, reminder_id: &str, list: &str) -> ServiceResult<MutationResult> {
        let reminder = self
            .store
            .fetch_reminder(&required_text("reminder id", reminder_id)?)?
            .ok_or_else(|| ServiceError::NotFound(format!("reminder {reminder_id}")))?;
        let target = resolve_list(&self.store, &required_text("list id", list)?)?;
        if reminder.list_id.as_deref() == Some(target.id.as_str()) {
            return Err(ServiceError::InvalidInput(format!(
                "reminder {} is already in list {}",
                reminder.id, target.id
            )));
        }
        if !target.writable {
            return Err(StoreError::ReadOnlyList(target.id).into());
        }
        let children = self
            .mirror
            .read_snapshot(MirrorSelector::Items)
            .items()
            .filter(|item| {
                item.parent_id
                    .as_deref()
                    .is_some_and(|parent| same_identifier(parent, &reminder.id))
            })
            .count();
        if children > 0 {
            return Err(ServiceError::InvalidInput(format!(
                "reminder {} has {children} subtasks; move them first",
                reminder.id
            )));
        }

        let result = self.engine.run(&Operation::MoveReminder {
            reminder_id: reminder.id.clone(),
            target_list_id: target.id.clone(),
            title: reminder.title.clone().unwrap_or_default(),
            notes: reminder.notes.clone(),
            completed: reminder.completed,
            priority: reminder.priority,
            due_date: reminder.due_date,
        })?;
        info!(
            "event=reminder_move module=service status=ok id={} list={} placeholder={}",
            reminder.id,
            target.id,
            result.has_placeholder()
        );
        Ok(result)
    }

    /// Reconciled task forest, optionally limited to one list.
    pub fn tree(&self, list: Option<&str>) -> ServiceResult<Reconciled> {
        let list_id = match list {
            Some(list) => Some(resolve_list(&self.store, list)?.id),
            None => None,
        };
        let predicate = match &list_id {
            Some(list_id) => ReminderPredicate::InLists(vec![list_id.clone()]),
            None => ReminderPredicate::All,
        };
        let records = self.mirror.read_records(MirrorSelector::All);
        let live = live_objects(&self.store, &predicate)?;
        let mut reconciled = reconcile(&records, &live);

        if let Some(list_id) = &list_id {
            reconciled
                .tasks
                .retain(|task| task.list_id.as_deref() == Some(list_id.as_str()));
            reconciled
                .sections
                .retain(|section| section.list_id.as_deref() == Some(list_id.as_str()));
            reconciled.containers.retain(|container| &container.id == list_id);
        }
        info!(
            "event=tree module=service status=ok tasks={}",
            reconciled.task_count()
        );
        Ok(reconciled)
    }

    /// Probes every declared undocumented-API symbol.
    pub fn capabilities(&self) -> Vec<Capability> {
        let resolver = self.engine.resolver();
        let capabilities: Vec<Capability> = self
            .engine
            .signatures()
            .symbols()
            .iter()
            .map(|symbol| resolver.probe(symbol))
            .collect();
        info!(
            "event=capabilities module=service status=ok total={} missing={}",
            capabilities.len(),
            capabilities.iter().filter(|c| !c.available).count()
        );
        capabilities
    }
}

//! Subtask use-case service.
//!
//! # Responsibility
//! - Create subtasks through the undocumented graph.
//! - List, update and delete subtasks through the public store and mirror.
//!
//! # Invariants
//! - A subtask is only created under a parent the public store knows.
//! - Update and delete go through the stable API only.

use super::{required_text, ServiceError, ServiceResult};
use crate::graph::builder::Operation;
use crate::graph::commit::MutationResult;
use crate::graph::engine::MutationEngine;
use crate::mirror::{MirrorReader, MirrorSelector};
use crate::model::entity::Task;
use crate::reconcile::reconcile;
use crate::store::{live_objects, LiveReminder, PublicStore, ReminderPatch, ReminderPredicate};
use log::info;

/// Subtask service facade.
pub struct SubtaskService<'a, S: PublicStore> {
    store: S,
    engine: MutationEngine<'a>,
    mirror: MirrorReader,
}

impl<'a, S: PublicStore> SubtaskService<'a, S> {
    pub fn new(store: S, engine: MutationEngine<'a>, mirror: MirrorReader) -> Self {
        Self {
            store,
            engine,
            mirror,
        }
    }

    /// Creates `title` as a subtask of `parent_id`.
    pub fn create(&self, parent_id: &str, title: &str) -> ServiceResult<MutationResult> {
        let title = required_text("title", title)?;
        let parent = self.parent(parent_id)?;
        let result = self.engine.run(&Operation::CreateSubtask {
            parent_id: parent.id.clone(),
            title,
        })?;
        info!(
            "event=subtask_create module=service status=ok parent={} placeholder={}",
            parent.id,
            result.has_placeholder()
        );
        Ok(result)
    }

    /// Children of `parent_id` in display order, nested.
    pub fn list(&self, parent_id: &str) -> ServiceResult<Vec<Task>> {
        let parent = self.parent(parent_id)?;
        let records = self.mirror.read_records(MirrorSelector::All);
        let predicate = match &parent.list_id {
            Some(list_id) => ReminderPredicate::InLists(vec![list_id.clone()]),
            None => ReminderPredicate::All,
        };
        let live = live_objects(&self.store, &predicate)?;
        let reconciled = reconcile(&records, &live);
        let children = reconciled
            .find_task(&parent.id)
            .map(|task| task.children.clone())
            .unwrap_or_default();
        info!(
            "event=subtask_list module=service status=ok parent={} count={}",
            parent.id,
            children.len()
        );
        Ok(children)
    }

    /// Renames a subtask. Without a title the current state is returned.
    pub fn update(&self, subtask_id: &str, title: Option<&str>) -> ServiceResult<LiveReminder> {
        let Some(title) = title else {
            return self
                .store
                .fetch_reminder(subtask_id)?
                .ok_or_else(|| ServiceError::NotFound(format!("reminder {subtask_id}")));
        };
        let patch = ReminderPatch {
            title: Some(required_text("title", title)?),
            ..ReminderPatch::default()
        };
        let updated = self.store.update_reminder(subtask_id, &patch)?;
        self.store.save()?;
        info!("event=subtask_update module=service status=ok id={}", updated.id);
        Ok(updated)
    }

    pub fn delete(&self, subtask_id: &str) -> ServiceResult<()> {
        self.store.delete_reminder(subtask_id)?;
        self.store.save()?;
        info!("event=subtask_delete module=service status=ok id={subtask_id}");
        Ok(())
    }

    fn parent(&self, parent_id: &str) -> ServiceResult<LiveReminder> {
        let parent_id = required_text("parent id", parent_id)?;
        self.store
            .fetch_reminder(&parent_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("reminder {parent_id}")))
    }
}

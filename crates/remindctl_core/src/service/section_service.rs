//! Section use-case service.
//!
//! # Responsibility
//! - Create, rename, delete sections and assign reminders to them through
//!   the undocumented graph.
//! - List sections and the container sharing summary from the mirror.
//!
//! # Invariants
//! - Membership rebuilds start from the mirror snapshot taken before the
//!   transaction.
//! - A reminder is never assigned to a section the mirror places in
//!   another list.

use super::{required_text, ServiceError, ServiceResult};
use crate::graph::builder::Operation;
use crate::graph::commit::MutationResult;
use crate::graph::engine::MutationEngine;
use crate::mirror::{MirrorReader, MirrorSelector, MirrorSnapshot};
use crate::model::entity::{Container, Section};
use crate::model::id::normalize_identifier;
use crate::model::membership::{rebuild_memberships, reference_timestamp_now};
use crate::reconcile::reconcile;
use crate::store::{resolve_list, LiveObject, PublicStore};
use log::{debug, info};

/// Section service facade.
pub struct SectionService<'a, S: PublicStore> {
    store: S,
    engine: MutationEngine<'a>,
    mirror: MirrorReader,
}

impl<'a, S: PublicStore> SectionService<'a, S> {
    pub fn new(store: S, engine: MutationEngine<'a>, mirror: MirrorReader) -> Self {
        Self {
            store,
            engine,
            mirror,
        }
    }

    /// Creates a section named `display_name` in the given list.
    pub fn create(&self, list: &str, display_name: &str) -> ServiceResult<MutationResult> {
        let display_name = required_text("display name", display_name)?;
        let list = resolve_list(&self.store, &required_text("list id", list)?)?;
        let result = self.engine.run(&Operation::CreateSection {
            list_id: list.id.clone(),
            display_name,
        })?;
        info!(
            "event=section_create module=service status=ok list={} placeholder={}",
            list.id,
            result.has_placeholder()
        );
        Ok(result)
    }

    /// Section catalog, optionally limited to one list.
    pub fn list(&self, list: Option<&str>) -> ServiceResult<Vec<Section>> {
        let list_id = match list {
            Some(list) => Some(resolve_list(&self.store, list)?.id),
            None => None,
        };
        let records = self.mirror.read_records(MirrorSelector::All);
        let live = self.live_lists()?;
        let sections: Vec<Section> = reconcile(&records, &live)
            .sections
            .into_iter()
            .filter(|section| list_id.is_none() || section.list_id == list_id)
            .collect();
        info!(
            "event=section_list module=service status=ok count={}",
            sections.len()
        );
        Ok(sections)
    }

    pub fn update(&self, section_id: &str, display_name: &str) -> ServiceResult<MutationResult> {
        let operation = Operation::RenameSection {
            section_id: normalize_identifier(&required_text("section id", section_id)?),
            display_name: required_text("display name", display_name)?,
        };
        Ok(self.engine.run(&operation)?)
    }

    pub fn delete(&self, section_id: &str) -> ServiceResult<MutationResult> {
        let operation = Operation::DeleteSection {
            section_id: normalize_identifier(&required_text("section id", section_id)?),
        };
        Ok(self.engine.run(&operation)?)
    }

    /// Live lists joined with their mirror sharing status.
    pub fn lists(&self) -> ServiceResult<Vec<Container>> {
        let records = self.mirror.read_records(MirrorSelector::All);
        let containers = reconcile(&records, &self.live_lists()?).containers;
        info!(
            "event=section_lists module=service status=ok count={}",
            containers.len()
        );
        Ok(containers)
    }

    /// Moves `reminder_id` into `section_id`, or out of any section on `None`.
    pub fn assign(&self, reminder_id: &str, section_id: Option<&str>) -> ServiceResult<MutationResult> {
        let reminder = self
            .store
            .fetch_reminder(&required_text("reminder id", reminder_id)?)?
            .ok_or_else(|| ServiceError::NotFound(format!("reminder {reminder_id}")))?;
        let list_id = reminder.list_id.clone().ok_or_else(|| {
            ServiceError::InvalidInput(format!("reminder {} has no list", reminder.id))
        })?;
        let section_id = match section_id {
            Some(section_id) => Some(required_text("section id", section_id)?),
            None => None,
        };

        let snapshot = self.mirror.read_snapshot(MirrorSelector::All);
        let operation =
            membership_operation(&snapshot, &list_id, &reminder.id, section_id.as_deref())?;
        let result = self.engine.run(&operation)?;
        info!(
            "event=section_assign module=service status=ok reminder={} ungroup={}",
            reminder.id,
            section_id.is_none()
        );
        Ok(result)
    }

    fn live_lists(&self) -> ServiceResult<Vec<LiveObject>> {
        Ok(self
            .store
            .fetch_lists()?
            .into_iter()
            .map(LiveObject::List)
            .collect())
    }
}

/// Builds the membership transaction for one reassignment.
///
/// `snapshot` must be read before the transaction starts.
pub(crate) fn membership_operation(
    snapshot: &MirrorSnapshot,
    list_id: &str,
    reminder_id: &str,
    section_id: Option<&str>,
) -> ServiceResult<Operation> {
    let list_id = normalize_identifier(list_id);
    let section_id = section_id.map(normalize_identifier);

    if let Some(section_id) = &section_id {
        match snapshot.section(section_id) {
            Some(section) if section.list_id.as_deref().is_some_and(|owner| owner != list_id) => {
                return Err(ServiceError::InvalidInput(format!(
                    "section {section_id} belongs to another list"
                )));
            }
            Some(_) => {}
            None => debug!(
                "event=section_assign module=service status=skipped reason=section_not_mirrored section={section_id}"
            ),
        }
    }

    let existing = snapshot
        .container(&list_id)
        .map(|container| container.memberships.as_slice())
        .unwrap_or_default();
    let memberships = rebuild_memberships(
        existing,
        reminder_id,
        section_id.as_deref(),
        reference_timestamp_now(),
    );
    Ok(Operation::AssignSection {
        list_id,
        memberships,
    })
}

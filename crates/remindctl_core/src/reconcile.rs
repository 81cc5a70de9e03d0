//! Cross-source reconciler.
//!
//! # Responsibility
//! - Join mirror records and live objects on normalized identifiers.
//! - Build ordered task trees, the section catalog and the sharing summary.
//!
//! # Invariants
//! - Children are ordered by display order ascending; unordered children
//!   follow ordered ones and keep their input order.
//! - Tree construction terminates on cyclic parent links and places every
//!   task exactly once.
//! - A task without a known section membership is ungrouped.

use crate::mirror::{ContainerRecord, ItemRecord, MirrorRecord, SectionRecord};
use crate::model::entity::{Container, DomainEntity, IdSource, Section, SharingStatus, Task};
use crate::model::id::normalize_identifier;
use crate::store::{LiveList, LiveObject, LiveReminder};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Reconciled view of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciled {
    /// Top-level tasks with nested children.
    pub tasks: Vec<Task>,
    pub sections: Vec<Section>,
    pub containers: Vec<Container>,
}

impl Reconciled {
    /// Finds a task anywhere in the forest.
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        let id = normalize_identifier(id);
        self.tasks.iter().find_map(|task| task.find(&id))
    }

    pub fn find_section(&self, id: &str) -> Option<&Section> {
        let id = normalize_identifier(id);
        self.sections.iter().find(|section| section.id == id)
    }

    /// Top-level tasks of one list.
    pub fn tasks_in_list(&self, list_id: &str) -> Vec<&Task> {
        let list_id = normalize_identifier(list_id);
        self.tasks
            .iter()
            .filter(|task| task.list_id.as_deref() == Some(list_id.as_str()))
            .collect()
    }

    /// Total number of tasks in the forest.
    pub fn task_count(&self) -> usize {
        self.tasks.iter().map(Task::subtree_len).sum()
    }

    /// Flattens into caller-facing entities: containers, sections, tasks.
    pub fn into_entities(self) -> Vec<DomainEntity> {
        let mut entities: Vec<DomainEntity> = Vec::new();
        entities.extend(self.containers.into_iter().map(DomainEntity::Container));
        entities.extend(self.sections.into_iter().map(DomainEntity::Section));
        entities.extend(self.tasks.into_iter().map(DomainEntity::Task));
        entities
    }
}

/// Merges mirror records with live objects into domain entities.
pub fn reconcile(records: &[MirrorRecord], live: &[LiveObject]) -> Reconciled {
    let mut items: Vec<&ItemRecord> = Vec::new();
    let mut container_records: Vec<&ContainerRecord> = Vec::new();
    let mut section_records: Vec<&SectionRecord> = Vec::new();
    for record in records {
        match record {
            MirrorRecord::Item(item) => items.push(item),
            MirrorRecord::Container(container) => container_records.push(container),
            MirrorRecord::Section(section) => section_records.push(section),
        }
    }
    let mut reminders: Vec<&LiveReminder> = Vec::new();
    let mut lists: Vec<&LiveList> = Vec::new();
    for object in live {
        match object {
            LiveObject::Reminder(reminder) => reminders.push(reminder),
            LiveObject::List(list) => lists.push(list),
        }
    }

    let sections = build_sections(&section_records, &container_records);
    let known_sections: HashSet<&str> = sections.iter().map(|section| section.id.as_str()).collect();
    let membership = membership_map(&container_records);
    let tasks = build_tasks(&items, &reminders, &membership, &known_sections);
    let containers = build_containers(&lists, &container_records, &sections);

    debug!(
        "event=reconcile module=reconcile status=ok tasks={} sections={} containers={}",
        tasks.len(),
        sections.len(),
        containers.len()
    );
    Reconciled {
        tasks,
        sections,
        containers,
    }
}

/// member -> group, first occurrence wins.
fn membership_map(containers: &[&ContainerRecord]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for container in containers {
        for membership in &container.memberships {
            map.entry(normalize_identifier(&membership.member_id))
                .or_insert_with(|| normalize_identifier(&membership.group_id));
        }
    }
    map
}

fn build_sections(records: &[&SectionRecord], containers: &[&ContainerRecord]) -> Vec<Section> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(normalize_identifier(&record.id)))
        .map(|record| {
            let id = normalize_identifier(&record.id);
            let member_ids = containers
                .iter()
                .flat_map(|container| container.memberships.iter())
                .filter(|membership| normalize_identifier(&membership.group_id) == id)
                .map(|membership| normalize_identifier(&membership.member_id))
                .collect();
            Section {
                id,
                display_name: record.display_name.clone(),
                list_id: record.list_id.as_deref().map(normalize_identifier),
                member_ids,
            }
        })
        .collect()
}

fn build_containers(
    lists: &[&LiveList],
    records: &[&ContainerRecord],
    sections: &[Section],
) -> Vec<Container> {
    let by_id: HashMap<String, &ContainerRecord> = records
        .iter()
        .map(|record| (normalize_identifier(&record.id), *record))
        .collect();
    let section_ids = |list_id: &str| -> Vec<String> {
        sections
            .iter()
            .filter(|section| section.list_id.as_deref() == Some(list_id))
            .map(|section| section.id.clone())
            .collect()
    };

    let mut containers = Vec::with_capacity(lists.len());
    let mut placed = HashSet::new();
    for list in lists {
        let id = normalize_identifier(&list.id);
        if !placed.insert(id.clone()) {
            continue;
        }
        let sharing_status = by_id
            .get(&id)
            .map(|record| SharingStatus::from_code(record.sharing_status))
            .unwrap_or(SharingStatus::Unknown);
        containers.push(Container {
            section_ids: section_ids(&id),
            id,
            id_source: IdSource::Public,
            title: Some(list.title.clone()),
            writable: Some(list.writable),
            sharing_status,
        });
    }
    for record in records {
        let id = normalize_identifier(&record.id);
        if !placed.insert(id.clone()) {
            continue;
        }
        containers.push(Container {
            section_ids: section_ids(&id),
            id,
            id_source: IdSource::Mirror,
            title: record.name.clone(),
            writable: None,
            sharing_status: SharingStatus::from_code(record.sharing_status),
        });
    }
    containers
}

/// Flat node before tree assembly.
struct Node {
    task: Task,
    parent: Option<String>,
}

fn build_tasks(
    items: &[&ItemRecord],
    reminders: &[&LiveReminder],
    membership: &HashMap<String, String>,
    known_sections: &HashSet<&str>,
) -> Vec<Task> {
    let mirror: HashMap<String, &ItemRecord> = items
        .iter()
        .map(|item| (normalize_identifier(&item.id), *item))
        .collect();

    // Live objects first, in input order, then mirror-only items.
    let mut order: Vec<String> = Vec::new();
    let mut nodes: HashMap<String, Node> = HashMap::new();
    for reminder in reminders {
        let id = normalize_identifier(&reminder.id);
        if nodes.contains_key(&id) {
            continue;
        }
        let item = mirror.get(&id).copied();
        nodes.insert(id.clone(), live_node(&id, reminder, item));
        order.push(id);
    }
    for item in items {
        let id = normalize_identifier(&item.id);
        if nodes.contains_key(&id) {
            continue;
        }
        nodes.insert(id.clone(), mirror_node(&id, item));
        order.push(id);
    }

    for id in &order {
        if let Some(node) = nodes.get_mut(id) {
            node.task.section_id = membership
                .get(id)
                .filter(|group| known_sections.contains(group.as_str()))
                .cloned();
        }
    }

    // Parent links only count when the parent is a known, different task.
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots: Vec<String> = Vec::new();
    for id in &order {
        let parent = nodes
            .get(id)
            .and_then(|node| node.parent.clone())
            .filter(|parent| parent != id && nodes.contains_key(parent));
        match parent {
            Some(parent) => children.entry(parent).or_default().push(id.clone()),
            None => roots.push(id.clone()),
        }
    }
    for siblings in children.values_mut() {
        sort_by_display_order(siblings, &nodes);
    }
    sort_by_display_order(&mut roots, &nodes);

    let mut visited: HashSet<String> = HashSet::new();
    let mut forest = Vec::with_capacity(roots.len());
    for root in &roots {
        if let Some(task) = attach(root, &nodes, &children, &mut visited) {
            forest.push(task);
        }
    }

    // Whatever is left sits on a parent cycle; lift it to the top level.
    for id in &order {
        if visited.contains(id) {
            continue;
        }
        warn!("event=reconcile module=reconcile status=error error_code=parent_cycle task={id}");
        if let Some(task) = attach(id, &nodes, &children, &mut visited) {
            forest.push(task);
        }
    }
    forest
}

/// Builds the subtree under `root` without recursing, so chain depth is
/// bounded by heap rather than stack.
fn attach(
    root: &str,
    nodes: &HashMap<String, Node>,
    children: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
) -> Option<Task> {
    if !visited.insert(root.to_string()) {
        return None;
    }

    // Pre-order walk; each entry remembers the parent it was reached from.
    let mut walk: Vec<(String, Option<String>)> = Vec::new();
    let mut pending = vec![(root.to_string(), None)];
    while let Some((id, parent)) = pending.pop() {
        if let Some(child_ids) = children.get(&id) {
            for child_id in child_ids.iter().rev() {
                if visited.insert(child_id.clone()) {
                    pending.push((child_id.clone(), Some(id.clone())));
                }
            }
        }
        walk.push((id, parent));
    }

    // Reverse pre-order finishes every child before its parent.
    let mut finished: HashMap<String, Vec<Task>> = HashMap::new();
    let mut tree = None;
    for (id, parent) in walk.into_iter().rev() {
        let Some(node) = nodes.get(&id) else {
            continue;
        };
        let mut task = node.task.clone();
        task.parent_id = parent.clone();
        if let Some(mut done) = finished.remove(&id) {
            done.reverse();
            task.children = done;
        }
        match parent {
            Some(parent) => finished.entry(parent).or_default().push(task),
            None => tree = Some(task),
        }
    }
    tree
}

fn sort_by_display_order(ids: &mut [String], nodes: &HashMap<String, Node>) {
    // Stable: equal keys keep input order.
    ids.sort_by_key(|id| {
        let order = nodes.get(id).and_then(|node| node.task.display_order);
        (order.is_none(), order.unwrap_or(0))
    });
}

fn live_node(id: &str, reminder: &LiveReminder, item: Option<&ItemRecord>) -> Node {
    Node {
        task: Task {
            id: id.to_string(),
            id_source: IdSource::Public,
            title: reminder.title.clone(),
            notes: reminder.notes.clone(),
            completed: reminder.completed,
            priority: reminder.priority,
            due_date: reminder.due_date,
            list_id: reminder
                .list_id
                .as_deref()
                .or_else(|| item.and_then(|item| item.list_id.as_deref()))
                .map(normalize_identifier),
            parent_id: None,
            section_id: None,
            display_order: item.and_then(|item| item.display_order),
            children: Vec::new(),
        },
        parent: item
            .and_then(|item| item.parent_id.as_deref())
            .map(normalize_identifier),
    }
}

fn mirror_node(id: &str, item: &ItemRecord) -> Node {
    Node {
        task: Task {
            id: id.to_string(),
            id_source: IdSource::Mirror,
            title: item.title.clone(),
            notes: None,
            completed: item.completed,
            priority: 0,
            due_date: None,
            list_id: item.list_id.as_deref().map(normalize_identifier),
            parent_id: None,
            section_id: None,
            display_order: item.display_order,
            children: Vec::new(),
        },
        parent: item.parent_id.as_deref().map(normalize_identifier),
    }
}

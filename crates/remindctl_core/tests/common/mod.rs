//! Shared fixtures: a fake host serving both native surfaces and a mirror
//! file writer in the host schema.
#![allow(dead_code)]

use remindctl_core::bridge::signature::{ek, rem, symbol, SymbolRef};
use remindctl_core::{
    normalize_identifier, private_signatures, public_signatures, BridgedStore, Completion, Handle,
    LibraryInfo, MirrorReader, MutationEngine, NativeEntry, NativeFailure, NativeResult,
    SymbolBackend, SymbolName, SymbolResolver, TypedInvoker, Value,
};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ZREMCDBASELIST (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZNAME TEXT,
        ZSHARINGSTATUS INTEGER, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA BLOB, ZMARKEDFORDELETION INTEGER);
    CREATE TABLE IF NOT EXISTS ZREMCDBASESECTION (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZDISPLAYNAME TEXT,
        ZLIST INTEGER, ZMARKEDFORDELETION INTEGER);
    CREATE TABLE IF NOT EXISTS ZREMCDREMINDER (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZPARENTREMINDER INTEGER,
        ZLIST INTEGER, ZICSDISPLAYORDER INTEGER, ZTITLE TEXT, ZCOMPLETED INTEGER, ZMARKEDFORDELETION INTEGER);";

/// Fixed, well-formed identifiers for seeded objects.
pub fn uuid(n: u32) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

pub fn membership_blob(entries: &[(&str, &str)]) -> Vec<u8> {
    let memberships: Vec<serde_json::Value> = entries
        .iter()
        .enumerate()
        .map(|(index, (member, group))| {
            json!({ "memberID": member, "groupID": group, "modifiedOn": 700_000_000.0 + index as f64 })
        })
        .collect();
    serde_json::to_vec(&json!({ "minimumSupportedVersion": 20230430, "memberships": memberships }))
        .unwrap()
}

/// Mirror file written row by row.
pub struct MirrorFile {
    pub path: PathBuf,
    conn: Connection,
}

impl MirrorFile {
    pub fn create(dir: &Path, name: &str) -> Self {
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { path, conn }
    }

    pub fn list(&self, pk: i64, id: &str, name: &str, sharing: i64, memberships: &[(&str, &str)]) -> &Self {
        let blob = (!memberships.is_empty()).then(|| membership_blob(memberships));
        self.conn
            .execute(
                "INSERT INTO ZREMCDBASELIST (Z_PK, ZCKIDENTIFIER, ZNAME, ZSHARINGSTATUS, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![pk, id, name, sharing, blob],
            )
            .unwrap();
        self
    }

    pub fn reminder(
        &self,
        pk: i64,
        id: Option<&str>,
        parent: Option<i64>,
        list: i64,
        order: Option<i64>,
        title: &str,
    ) -> &Self {
        self.conn
            .execute(
                "INSERT INTO ZREMCDREMINDER (Z_PK, ZCKIDENTIFIER, ZPARENTREMINDER, ZLIST, ZICSDISPLAYORDER, ZTITLE, ZCOMPLETED)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![pk, id, parent, list, order, title],
            )
            .unwrap();
        self
    }

    pub fn section(&self, pk: i64, id: &str, name: &str, list: i64) -> &Self {
        self.conn
            .execute(
                "INSERT INTO ZREMCDBASESECTION (Z_PK, ZCKIDENTIFIER, ZDISPLAYNAME, ZLIST) VALUES (?1, ?2, ?3, ?4)",
                params![pk, id, name, list],
            )
            .unwrap();
        self
    }

    pub fn execute(&self, sql: &str) {
        self.conn.execute_batch(sql).unwrap();
    }
}

#[derive(Debug, Clone)]
pub struct HostList {
    pub pk: i64,
    pub id: String,
    pub name: String,
    pub sharing: i64,
    pub writable: bool,
    pub memberships: Vec<(String, String, f64)>,
}

#[derive(Debug, Clone)]
pub struct HostReminder {
    pub pk: i64,
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub completed: bool,
    pub priority: i64,
    pub due_date: Option<f64>,
    pub list_pk: i64,
    pub parent_pk: Option<i64>,
    pub order: i64,
}

#[derive(Debug, Clone)]
pub struct HostSection {
    pub pk: i64,
    pub id: String,
    pub name: String,
    pub list_pk: i64,
}

#[derive(Debug, Clone, Default)]
struct Edit {
    title: Option<String>,
    notes: Option<String>,
    completed: Option<bool>,
    priority: Option<i64>,
    due_date: Option<f64>,
    list_pk: Option<i64>,
}

#[derive(Debug, Clone)]
enum Obj {
    Store,
    Request,
    List(i64),
    ListChange(i64),
    SectionsContext(i64),
    Reminder(i64),
    ReminderChange(i64),
    SubtaskContext(i64),
    NewReminder(usize, String),
    Section(i64),
    SectionChange(i64),
    NewSection(String),
    ObjectId(String),
    Membership(String, String, f64),
    Memberships(Vec<(String, String, f64)>),
    Calendar(i64),
    Predicate(Vec<i64>),
    PubReminder(i64, Edit),
    PubDraft(String, Edit),
}

#[derive(Debug, Clone)]
enum Pending {
    AddReminder {
        id: String,
        title: String,
        list_pk: i64,
        parent_pk: Option<i64>,
        edit: Edit,
    },
    AddSection { id: String, name: String, list_pk: i64 },
    RenameSection { pk: i64, name: String },
    RemoveSection { pk: i64 },
    RemoveReminder { pk: i64 },
    SetMemberships { list_pk: i64, entries: Vec<(String, String, f64)> },
}

#[derive(Debug, Clone)]
enum PublicChange {
    Create(String, Edit),
    Update(i64, Edit),
    Remove(i64),
}

#[derive(Default)]
pub struct HostState {
    pub lists: Vec<HostList>,
    pub reminders: Vec<HostReminder>,
    pub sections: Vec<HostSection>,
    objects: HashMap<u64, Obj>,
    next_handle: u64,
    next_pk: i64,
    pending: Vec<Pending>,
    public_staged: Vec<PublicChange>,
    pub calls: Vec<String>,
    pub resolutions: HashMap<String, usize>,
    pub loads: usize,
    pub saves: usize,
    pub commits: usize,
    missing: HashSet<String>,
    failing: HashSet<String>,
    opaque_identities: bool,
}

fn failure(message: impl Into<String>) -> NativeFailure {
    NativeFailure::new(message)
}

fn handle_arg(args: &[Value], index: usize) -> Result<u64, NativeFailure> {
    args.get(index)
        .and_then(Value::as_handle)
        .map(Handle::raw)
        .ok_or_else(|| failure(format!("argument {index} is not a handle")))
}

fn text_arg(args: &[Value], index: usize) -> Result<String, NativeFailure> {
    args.get(index)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| failure(format!("argument {index} is not text")))
}

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Nil)
}

impl HostState {
    fn alloc(&mut self, obj: Obj) -> Value {
        self.next_handle += 1;
        self.objects.insert(self.next_handle, obj);
        Value::Handle(Handle::from_raw(self.next_handle))
    }

    fn obj(&self, args: &[Value], index: usize) -> Result<Obj, NativeFailure> {
        let raw = handle_arg(args, index)?;
        self.objects
            .get(&raw)
            .cloned()
            .ok_or_else(|| failure(format!("stale handle {raw}")))
    }

    fn pk(&mut self) -> i64 {
        self.next_pk += 1;
        self.next_pk
    }

    fn list_by_id(&self, id: &str) -> Option<&HostList> {
        let id = normalize_identifier(id);
        self.lists.iter().find(|list| list.id == id)
    }

    fn list_by_pk(&self, pk: i64) -> Option<&HostList> {
        self.lists.iter().find(|list| list.pk == pk)
    }

    fn reminder_by_id(&self, id: &str) -> Option<&HostReminder> {
        let id = normalize_identifier(id);
        self.reminders.iter().find(|reminder| reminder.id == id)
    }

    fn reminder_by_pk(&self, pk: i64) -> Option<&HostReminder> {
        self.reminders.iter().find(|reminder| reminder.pk == pk)
    }

    fn identity_handle(&mut self, id: String) -> Value {
        if self.opaque_identities {
            Value::Nil
        } else {
            self.alloc(Obj::ObjectId(id))
        }
    }

    fn dispatch(&mut self, key: SymbolRef, args: &[Value]) -> NativeResult {
        match key {
            rem::STORE_NEW | ek::STORE_NEW => Ok(self.alloc(Obj::Store)),
            rem::SAVE_REQUEST_INIT => {
                self.pending.clear();
                Ok(self.alloc(Obj::Request))
            }
            rem::FETCH_LIST => {
                let pk = self.list_by_id(&text_arg(args, 1)?).map(|list| list.pk);
                let pk = pk.ok_or_else(|| failure("no such list"))?;
                Ok(self.alloc(Obj::List(pk)))
            }
            rem::FETCH_REMINDER => {
                let pk = self.reminder_by_id(&text_arg(args, 1)?).map(|r| r.pk);
                let pk = pk.ok_or_else(|| failure("no such reminder"))?;
                Ok(self.alloc(Obj::Reminder(pk)))
            }
            rem::FETCH_SECTION => {
                let id = normalize_identifier(&text_arg(args, 1)?);
                let pk = self.sections.iter().find(|s| s.id == id).map(|s| s.pk);
                let pk = pk.ok_or_else(|| failure("no such section"))?;
                Ok(self.alloc(Obj::Section(pk)))
            }
            rem::UPDATE_LIST => match self.obj(args, 1)? {
                Obj::List(pk) => Ok(self.alloc(Obj::ListChange(pk))),
                _ => Err(failure("not a list")),
            },
            rem::UPDATE_REMINDER => match self.obj(args, 1)? {
                Obj::Reminder(pk) => Ok(self.alloc(Obj::ReminderChange(pk))),
                _ => Err(failure("not a reminder")),
            },
            rem::UPDATE_SECTION => match self.obj(args, 1)? {
                Obj::Section(pk) => Ok(self.alloc(Obj::SectionChange(pk))),
                _ => Err(failure("not a section")),
            },
            rem::SECTIONS_CONTEXT_OF_LIST => match self.obj(args, 0)? {
                Obj::ListChange(pk) => Ok(self.alloc(Obj::SectionsContext(pk))),
                _ => Err(failure("not a list change item")),
            },
            rem::SUBTASK_CONTEXT_OF => match self.obj(args, 0)? {
                Obj::ReminderChange(pk) => Ok(self.alloc(Obj::SubtaskContext(pk))),
                _ => Err(failure("not a reminder change item")),
            },
            rem::ADD_REMINDER_TO_SUBTASKS => {
                let title = text_arg(args, 1)?;
                let Obj::SubtaskContext(parent) = self.obj(args, 2)? else {
                    return Err(failure("not a subtask context"));
                };
                let list_pk = self
                    .reminder_by_pk(parent)
                    .map(|r| r.list_pk)
                    .ok_or_else(|| failure("parent vanished"))?;
                Ok(self.stage_reminder(title, list_pk, Some(parent)))
            }
            rem::ADD_REMINDER_TO_LIST => {
                let title = text_arg(args, 1)?;
                let Obj::ListChange(list_pk) = self.obj(args, 2)? else {
                    return Err(failure("not a list change item"));
                };
                Ok(self.stage_reminder(title, list_pk, None))
            }
            rem::REMINDER_SET_NOTES
            | rem::REMINDER_SET_COMPLETED
            | rem::REMINDER_SET_PRIORITY
            | rem::REMINDER_SET_DUE_DATE => {
                let Obj::NewReminder(index, _) = self.obj(args, 0)? else {
                    return Err(failure("only staged reminders take setters"));
                };
                let value = args.get(1).cloned().unwrap_or(Value::Nil);
                if let Some(Pending::AddReminder { edit, .. }) = self.pending.get_mut(index) {
                    match key {
                        rem::REMINDER_SET_NOTES => edit.notes = value.as_text().map(str::to_string),
                        rem::REMINDER_SET_COMPLETED => edit.completed = value.as_bool(),
                        rem::REMINDER_SET_PRIORITY => edit.priority = value.as_int(),
                        _ => edit.due_date = value.as_float(),
                    }
                }
                Ok(Value::Void)
            }
            rem::REMINDER_REMOVE => match self.obj(args, 0)? {
                Obj::ReminderChange(pk) => {
                    self.pending.push(Pending::RemoveReminder { pk });
                    Ok(Value::Void)
                }
                _ => Err(failure("not a reminder change item")),
            },
            rem::NEW_SECTION => {
                let name = text_arg(args, 0)?;
                let Obj::SectionsContext(list_pk) = self.obj(args, 1)? else {
                    return Err(failure("not a sections context"));
                };
                let id = Uuid::new_v4().hyphenated().to_string().to_ascii_uppercase();
                self.pending.push(Pending::AddSection {
                    id: id.clone(),
                    name,
                    list_pk,
                });
                Ok(self.alloc(Obj::NewSection(id)))
            }
            rem::SECTION_SET_DISPLAY_NAME => match self.obj(args, 0)? {
                Obj::SectionChange(pk) => {
                    let name = text_arg(args, 1)?;
                    self.pending.push(Pending::RenameSection { pk, name });
                    Ok(Value::Void)
                }
                _ => Err(failure("not a section change item")),
            },
            rem::SECTION_REMOVE => match self.obj(args, 0)? {
                Obj::SectionChange(pk) => {
                    self.pending.push(Pending::RemoveSection { pk });
                    Ok(Value::Void)
                }
                _ => Err(failure("not a section change item")),
            },
            rem::NEW_MEMBERSHIP => {
                let member = text_arg(args, 0)?;
                let group = text_arg(args, 1)?;
                let at = args.get(2).and_then(Value::as_float).unwrap_or_default();
                Ok(self.alloc(Obj::Membership(member, group, at)))
            }
            rem::NEW_MEMBERSHIPS => {
                let handles = args
                    .first()
                    .cloned()
                    .and_then(Value::into_handles)
                    .ok_or_else(|| failure("expected a handle list"))?;
                let mut entries = Vec::with_capacity(handles.len());
                for handle in handles {
                    match self.objects.get(&handle.raw()) {
                        Some(Obj::Membership(m, g, at)) => entries.push((m.clone(), g.clone(), *at)),
                        _ => return Err(failure("not a membership")),
                    }
                }
                Ok(self.alloc(Obj::Memberships(entries)))
            }
            rem::SET_MEMBERSHIPS => {
                let Obj::SectionsContext(list_pk) = self.obj(args, 0)? else {
                    return Err(failure("not a sections context"));
                };
                let Obj::Memberships(entries) = self.obj(args, 1)? else {
                    return Err(failure("not a memberships wrapper"));
                };
                self.pending.push(Pending::SetMemberships { list_pk, entries });
                Ok(Value::Void)
            }
            rem::SAVE => {
                self.apply_pending();
                self.saves += 1;
                Ok(Value::Void)
            }
            rem::REMINDER_OBJECT_ID => match self.obj(args, 0)? {
                Obj::NewReminder(_, id) => Ok(self.identity_handle(id)),
                Obj::ReminderChange(pk) => {
                    let id = self.reminder_by_pk(pk).map(|r| r.id.clone());
                    Ok(id.map(|id| self.identity_handle(id)).unwrap_or(Value::Nil))
                }
                _ => Ok(Value::Nil),
            },
            rem::SECTION_OBJECT_ID => match self.obj(args, 0)? {
                Obj::NewSection(id) => Ok(self.identity_handle(id)),
                Obj::SectionChange(pk) => {
                    let id = self.sections.iter().find(|s| s.pk == pk).map(|s| s.id.clone());
                    Ok(id.map(|id| self.identity_handle(id)).unwrap_or(Value::Nil))
                }
                _ => Ok(Value::Nil),
            },
            rem::OBJECT_ID_UUID => match self.obj(args, 0)? {
                Obj::ObjectId(id) => Ok(Value::Text(id)),
                _ => Ok(Value::Nil),
            },
            rem::REMINDER_STORAGE_OF
            | rem::REMINDER_STORAGE_OBJECT_ID
            | rem::REMINDER_EXTERNAL_ID
            | rem::SECTION_STORAGE_OF
            | rem::SECTION_STORAGE_OBJECT_ID
            | rem::SECTION_EXTERNAL_ID => Ok(Value::Nil),

            ek::CALENDARS => {
                let pks: Vec<i64> = self.lists.iter().map(|list| list.pk).collect();
                let handles = pks
                    .into_iter()
                    .filter_map(|pk| self.alloc(Obj::Calendar(pk)).as_handle())
                    .collect();
                Ok(Value::HandleList(handles))
            }
            ek::CALENDAR_WITH_ID => {
                let pk = self.list_by_id(&text_arg(args, 1)?).map(|list| list.pk);
                Ok(pk.map(|pk| self.alloc(Obj::Calendar(pk))).unwrap_or(Value::Nil))
            }
            ek::ITEM_WITH_ID => {
                let pk = self.reminder_by_id(&text_arg(args, 1)?).map(|r| r.pk);
                Ok(pk
                    .map(|pk| self.alloc(Obj::PubReminder(pk, Edit::default())))
                    .unwrap_or(Value::Nil))
            }
            ek::PREDICATE_IN_CALENDARS => {
                let handles = args
                    .get(1)
                    .cloned()
                    .and_then(Value::into_handles)
                    .ok_or_else(|| failure("expected calendars"))?;
                let pks = handles
                    .iter()
                    .filter_map(|handle| match self.objects.get(&handle.raw()) {
                        Some(Obj::Calendar(pk)) => Some(*pk),
                        _ => None,
                    })
                    .collect();
                Ok(self.alloc(Obj::Predicate(pks)))
            }
            ek::FETCH_MATCHING => {
                let Obj::Predicate(pks) = self.obj(args, 1)? else {
                    return Err(failure("not a predicate"));
                };
                let matched: Vec<i64> = self
                    .reminders
                    .iter()
                    .filter(|r| pks.contains(&r.list_pk))
                    .map(|r| r.pk)
                    .collect();
                let handles = matched
                    .into_iter()
                    .filter_map(|pk| self.alloc(Obj::PubReminder(pk, Edit::default())).as_handle())
                    .collect();
                Ok(Value::HandleList(handles))
            }
            ek::NEW_REMINDER => {
                let id = Uuid::new_v4().hyphenated().to_string().to_ascii_uppercase();
                Ok(self.alloc(Obj::PubDraft(id, Edit::default())))
            }
            ek::SET_TITLE | ek::SET_NOTES | ek::SET_COMPLETED | ek::SET_PRIORITY | ek::SET_CALENDAR
            | ek::SET_DUE_DATE => self.edit(key, args),
            ek::SAVE_REMINDER => {
                let change = match self.obj(args, 1)? {
                    Obj::PubDraft(id, edit) => PublicChange::Create(id, edit),
                    Obj::PubReminder(pk, edit) => PublicChange::Update(pk, edit),
                    _ => return Err(failure("not a reminder")),
                };
                self.public_staged.push(change);
                Ok(Value::Void)
            }
            ek::REMOVE_REMINDER => match self.obj(args, 1)? {
                Obj::PubReminder(pk, _) => {
                    self.public_staged.push(PublicChange::Remove(pk));
                    Ok(Value::Void)
                }
                _ => Err(failure("not a committed reminder")),
            },
            ek::COMMIT => {
                self.apply_public();
                self.commits += 1;
                Ok(Value::Void)
            }
            ek::IDENTIFIER | ek::TITLE | ek::NOTES | ek::IS_COMPLETED | ek::PRIORITY
            | ek::DUE_DATE | ek::CALENDAR_OF => self.read(key, args),
            ek::CALENDAR_ID | ek::CALENDAR_TITLE | ek::CALENDAR_WRITABLE => {
                let Obj::Calendar(pk) = self.obj(args, 0)? else {
                    return Err(failure("not a calendar"));
                };
                let list = self.list_by_pk(pk).ok_or_else(|| failure("list vanished"))?;
                Ok(match key {
                    ek::CALENDAR_ID => Value::Text(list.id.clone()),
                    ek::CALENDAR_TITLE => Value::Text(list.name.clone()),
                    _ => Value::Bool(list.writable),
                })
            }
            _ => Err(failure(format!("unhandled symbol {}.{}", key.0, key.1))),
        }
    }

    fn stage_reminder(&mut self, title: String, list_pk: i64, parent_pk: Option<i64>) -> Value {
        let id = Uuid::new_v4().hyphenated().to_string().to_ascii_uppercase();
        self.pending.push(Pending::AddReminder {
            id: id.clone(),
            title,
            list_pk,
            parent_pk,
            edit: Edit::default(),
        });
        let index = self.pending.len() - 1;
        self.alloc(Obj::NewReminder(index, id))
    }

    fn edit(&mut self, key: SymbolRef, args: &[Value]) -> NativeResult {
        let raw = handle_arg(args, 0)?;
        let calendar = match args.get(1) {
            Some(Value::Handle(handle)) => match self.objects.get(&handle.raw()) {
                Some(Obj::Calendar(pk)) => Some(*pk),
                _ => None,
            },
            _ => None,
        };
        let edit = match self.objects.get_mut(&raw) {
            Some(Obj::PubDraft(_, edit)) | Some(Obj::PubReminder(_, edit)) => edit,
            _ => return Err(failure("not a reminder")),
        };
        let value = args.get(1).cloned().unwrap_or(Value::Nil);
        match key {
            ek::SET_TITLE => edit.title = value.as_text().map(str::to_string),
            ek::SET_NOTES => edit.notes = value.as_text().map(str::to_string),
            ek::SET_COMPLETED => edit.completed = value.as_bool(),
            ek::SET_PRIORITY => edit.priority = value.as_int(),
            ek::SET_DUE_DATE => edit.due_date = value.as_float(),
            ek::SET_CALENDAR => edit.list_pk = calendar,
            _ => {}
        }
        Ok(Value::Void)
    }

    fn read(&mut self, key: SymbolRef, args: &[Value]) -> NativeResult {
        let (id, base, edit) = match self.obj(args, 0)? {
            Obj::PubDraft(id, edit) => (id, None, edit),
            Obj::PubReminder(pk, edit) => {
                let base = self.reminder_by_pk(pk).cloned().ok_or_else(|| failure("reminder vanished"))?;
                (base.id.clone(), Some(base), edit)
            }
            _ => return Err(failure("not a reminder")),
        };
        let title = edit.title.clone().or_else(|| base.as_ref().map(|b| b.title.clone()));
        let notes = edit.notes.clone().or_else(|| base.as_ref().and_then(|b| b.notes.clone()));
        let completed = edit.completed.or(base.as_ref().map(|b| b.completed)).unwrap_or(false);
        let priority = edit.priority.or(base.as_ref().map(|b| b.priority)).unwrap_or(0);
        let due_date = edit.due_date.or(base.as_ref().and_then(|b| b.due_date));
        let list_pk = edit.list_pk.or(base.as_ref().map(|b| b.list_pk));
        Ok(match key {
            ek::IDENTIFIER => Value::Text(id),
            ek::TITLE => opt_text(title),
            ek::NOTES => opt_text(notes),
            ek::IS_COMPLETED => Value::Bool(completed),
            ek::PRIORITY => Value::Int(priority),
            ek::DUE_DATE => due_date.map(Value::Float).unwrap_or(Value::Nil),
            _ => match list_pk {
                Some(pk) => self.alloc(Obj::Calendar(pk)),
                None => Value::Nil,
            },
        })
    }

    fn next_order(&self, list_pk: i64, parent_pk: Option<i64>) -> i64 {
        self.reminders
            .iter()
            .filter(|r| r.list_pk == list_pk && r.parent_pk == parent_pk)
            .map(|r| r.order + 1)
            .max()
            .unwrap_or(0)
    }

    fn apply_pending(&mut self) {
        for change in std::mem::take(&mut self.pending) {
            match change {
                Pending::AddReminder {
                    id,
                    title,
                    list_pk,
                    parent_pk,
                    edit,
                } => {
                    let order = self.next_order(list_pk, parent_pk);
                    let pk = self.pk();
                    self.reminders.push(HostReminder {
                        pk,
                        id,
                        title,
                        notes: edit.notes,
                        completed: edit.completed.unwrap_or(false),
                        priority: edit.priority.unwrap_or(0),
                        due_date: edit.due_date,
                        list_pk,
                        parent_pk,
                        order,
                    });
                }
                Pending::AddSection { id, name, list_pk } => {
                    let pk = self.pk();
                    self.sections.push(HostSection { pk, id, name, list_pk });
                }
                Pending::RenameSection { pk, name } => {
                    if let Some(section) = self.sections.iter_mut().find(|s| s.pk == pk) {
                        section.name = name;
                    }
                }
                Pending::RemoveSection { pk } => self.sections.retain(|s| s.pk != pk),
                Pending::RemoveReminder { pk } => self.reminders.retain(|r| r.pk != pk),
                Pending::SetMemberships { list_pk, entries } => {
                    if let Some(list) = self.lists.iter_mut().find(|l| l.pk == list_pk) {
                        list.memberships = entries;
                    }
                }
            }
        }
    }

    fn apply_public(&mut self) {
        for change in std::mem::take(&mut self.public_staged) {
            match change {
                PublicChange::Create(id, edit) => {
                    let Some(list_pk) = edit.list_pk else { continue };
                    let order = self.next_order(list_pk, None);
                    let pk = self.pk();
                    self.reminders.push(HostReminder {
                        pk,
                        id,
                        title: edit.title.unwrap_or_default(),
                        notes: edit.notes,
                        completed: edit.completed.unwrap_or(false),
                        priority: edit.priority.unwrap_or(0),
                        due_date: edit.due_date,
                        list_pk,
                        parent_pk: None,
                        order,
                    });
                }
                PublicChange::Update(pk, edit) => {
                    if let Some(reminder) = self.reminders.iter_mut().find(|r| r.pk == pk) {
                        if let Some(title) = edit.title {
                            reminder.title = title;
                        }
                        if let Some(notes) = edit.notes {
                            reminder.notes = Some(notes);
                        }
                        if let Some(completed) = edit.completed {
                            reminder.completed = completed;
                        }
                        if let Some(priority) = edit.priority {
                            reminder.priority = priority;
                        }
                        if let Some(due_date) = edit.due_date {
                            reminder.due_date = Some(due_date);
                        }
                    }
                }
                PublicChange::Remove(pk) => self.reminders.retain(|r| r.pk != pk),
            }
        }
    }

    fn write_mirror(&self, path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "DELETE FROM ZREMCDBASELIST; DELETE FROM ZREMCDBASESECTION; DELETE FROM ZREMCDREMINDER;",
        )
        .unwrap();
        for list in &self.lists {
            let blob = (!list.memberships.is_empty()).then(|| {
                let memberships: Vec<serde_json::Value> = list
                    .memberships
                    .iter()
                    .map(|(m, g, at)| json!({ "memberID": m, "groupID": g, "modifiedOn": at }))
                    .collect();
                serde_json::to_vec(&json!({ "minimumSupportedVersion": 20230430, "memberships": memberships }))
                    .unwrap()
            });
            conn.execute(
                "INSERT INTO ZREMCDBASELIST (Z_PK, ZCKIDENTIFIER, ZNAME, ZSHARINGSTATUS, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![list.pk, list.id, list.name, list.sharing, blob],
            )
            .unwrap();
        }
        for section in &self.sections {
            conn.execute(
                "INSERT INTO ZREMCDBASESECTION (Z_PK, ZCKIDENTIFIER, ZDISPLAYNAME, ZLIST) VALUES (?1, ?2, ?3, ?4)",
                params![section.pk, section.id, section.name, section.list_pk],
            )
            .unwrap();
        }
        for reminder in &self.reminders {
            conn.execute(
                "INSERT INTO ZREMCDREMINDER (Z_PK, ZCKIDENTIFIER, ZPARENTREMINDER, ZLIST, ZICSDISPLAYORDER, ZTITLE, ZCOMPLETED)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    reminder.pk,
                    reminder.id,
                    reminder.parent_pk,
                    reminder.list_pk,
                    reminder.order,
                    reminder.title,
                    reminder.completed
                ],
            )
            .unwrap();
        }
    }
}

const CALLBACK_SYMBOLS: &[SymbolRef] = &[ek::FETCH_MATCHING];

/// Fake host behind both surfaces. Saves and commits rewrite the mirror file.
#[derive(Clone)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
    mirror_dir: PathBuf,
}

impl FakeHost {
    pub fn new(mirror_dir: &Path) -> Self {
        let host = Self {
            state: Arc::new(Mutex::new(HostState::default())),
            mirror_dir: mirror_dir.to_path_buf(),
        };
        host.persist();
        host
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.mirror_dir.join("Data-local.sqlite")
    }

    pub fn mirror(&self) -> MirrorReader {
        MirrorReader::new(&self.mirror_dir, "sqlite")
    }

    pub fn persist(&self) {
        let path = self.mirror_path();
        self.state().write_mirror(&path);
    }

    pub fn add_list(&self, id: &str, name: &str, sharing: i64) -> i64 {
        let mut state = self.state();
        let pk = state.pk();
        state.lists.push(HostList {
            pk,
            id: normalize_identifier(id),
            name: name.to_string(),
            sharing,
            writable: true,
            memberships: Vec::new(),
        });
        drop(state);
        self.persist();
        pk
    }

    pub fn add_reminder(&self, id: &str, title: &str, list_pk: i64, parent_pk: Option<i64>, order: i64) -> i64 {
        let mut state = self.state();
        let pk = state.pk();
        state.reminders.push(HostReminder {
            pk,
            id: normalize_identifier(id),
            title: title.to_string(),
            notes: None,
            completed: false,
            priority: 0,
            due_date: None,
            list_pk,
            parent_pk,
            order,
        });
        drop(state);
        self.persist();
        pk
    }

    pub fn add_section(&self, id: &str, name: &str, list_pk: i64) -> i64 {
        let mut state = self.state();
        let pk = state.pk();
        state.sections.push(HostSection {
            pk,
            id: normalize_identifier(id),
            name: name.to_string(),
            list_pk,
        });
        drop(state);
        self.persist();
        pk
    }

    /// Makes `symbol` unresolvable.
    pub fn remove_symbol(&self, target: SymbolRef) {
        self.state().missing.insert(symbol(target).to_string());
    }

    /// Makes every call of `symbol` fail.
    pub fn fail_symbol(&self, target: SymbolRef) {
        self.state().failing.insert(symbol(target).to_string());
    }

    /// Identity accessors return nil.
    pub fn hide_identities(&self) {
        self.state().opaque_identities = true;
    }

    pub fn calls_to(&self, target: SymbolRef) -> usize {
        let label = symbol(target).to_string();
        self.state().calls.iter().filter(|call| **call == label).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn resolutions_of(&self, target: SymbolRef) -> usize {
        let label = symbol(target).to_string();
        self.state().resolutions.get(&label).copied().unwrap_or(0)
    }

    pub fn private_resolver(&self) -> SymbolResolver {
        SymbolResolver::new("private", self.clone())
    }

    pub fn public_resolver(&self) -> SymbolResolver {
        SymbolResolver::new("public", self.clone())
    }

    fn call(&self, key: SymbolRef, label: &str, args: &[Value]) -> NativeResult {
        let mut state = self.state();
        state.calls.push(label.to_string());
        if state.failing.contains(label) {
            return Err(failure(format!("{label} refused by host")));
        }
        let result = state.dispatch(key, args);
        let persist = result.is_ok() && (key == rem::SAVE || key == ek::COMMIT);
        drop(state);
        if persist {
            self.persist();
        }
        result
    }
}

impl SymbolBackend for FakeHost {
    fn load_library(&self) -> Result<LibraryInfo, String> {
        self.state().loads += 1;
        Ok(LibraryInfo {
            origin: PathBuf::from("fake-host"),
        })
    }

    fn resolve(&self, name: &SymbolName) -> Result<NativeEntry, String> {
        let label = name.to_string();
        {
            let mut state = self.state();
            *state.resolutions.entry(label.clone()).or_default() += 1;
            if state.missing.contains(&label) {
                return Err(format!("symbol {label} is not exported"));
            }
        }
        let key = declared_key(name).ok_or_else(|| format!("symbol {label} is not exported"))?;
        let host = self.clone();
        if CALLBACK_SYMBOLS.contains(&key) {
            return Ok(NativeEntry::Callback(Arc::new(
                move |args: &[Value], completion: Completion| {
                    let result = host.call(key, &label, args);
                    std::thread::spawn(move || completion.complete(result));
                },
            )));
        }
        Ok(NativeEntry::Direct(Arc::new(move |args: &[Value]| {
            host.call(key, &label, args)
        })))
    }
}

/// Maps a declared symbol back to its static table key.
fn declared_key(name: &SymbolName) -> Option<SymbolRef> {
    ALL_KEYS
        .iter()
        .copied()
        .find(|key| symbol(*key) == *name)
}

const ALL_KEYS: &[SymbolRef] = &[
    rem::STORE_NEW,
    rem::FETCH_LIST,
    rem::FETCH_REMINDER,
    rem::FETCH_SECTION,
    rem::SAVE_REQUEST_INIT,
    rem::UPDATE_LIST,
    rem::UPDATE_REMINDER,
    rem::UPDATE_SECTION,
    rem::ADD_REMINDER_TO_LIST,
    rem::ADD_REMINDER_TO_SUBTASKS,
    rem::SAVE,
    rem::SECTIONS_CONTEXT_OF_LIST,
    rem::SET_MEMBERSHIPS,
    rem::NEW_SECTION,
    rem::SECTION_SET_DISPLAY_NAME,
    rem::SECTION_REMOVE,
    rem::SECTION_OBJECT_ID,
    rem::SECTION_STORAGE_OF,
    rem::SECTION_EXTERNAL_ID,
    rem::SECTION_STORAGE_OBJECT_ID,
    rem::SUBTASK_CONTEXT_OF,
    rem::REMINDER_SET_NOTES,
    rem::REMINDER_SET_COMPLETED,
    rem::REMINDER_SET_PRIORITY,
    rem::REMINDER_SET_DUE_DATE,
    rem::REMINDER_REMOVE,
    rem::REMINDER_OBJECT_ID,
    rem::REMINDER_STORAGE_OF,
    rem::REMINDER_EXTERNAL_ID,
    rem::REMINDER_STORAGE_OBJECT_ID,
    rem::OBJECT_ID_UUID,
    rem::NEW_MEMBERSHIP,
    rem::NEW_MEMBERSHIPS,
    ek::STORE_NEW,
    ek::CALENDARS,
    ek::CALENDAR_WITH_ID,
    ek::ITEM_WITH_ID,
    ek::PREDICATE_IN_CALENDARS,
    ek::FETCH_MATCHING,
    ek::SAVE_REMINDER,
    ek::REMOVE_REMINDER,
    ek::COMMIT,
    ek::NEW_REMINDER,
    ek::IDENTIFIER,
    ek::TITLE,
    ek::NOTES,
    ek::IS_COMPLETED,
    ek::PRIORITY,
    ek::DUE_DATE,
    ek::CALENDAR_OF,
    ek::SET_TITLE,
    ek::SET_NOTES,
    ek::SET_COMPLETED,
    ek::SET_PRIORITY,
    ek::SET_CALENDAR,
    ek::SET_DUE_DATE,
    ek::CALENDAR_ID,
    ek::CALENDAR_TITLE,
    ek::CALENDAR_WRITABLE,
];

/// Engine, public store and mirror reader wired over one host.
pub struct Wiring {
    pub private: SymbolResolver,
    pub public: SymbolResolver,
}

impl Wiring {
    pub fn new(host: &FakeHost) -> Self {
        Self {
            private: host.private_resolver(),
            public: host.public_resolver(),
        }
    }

    pub fn engine(&self) -> MutationEngine<'_> {
        MutationEngine::new(&self.private, private_signatures())
    }

    pub fn store(&self) -> BridgedStore<'_> {
        BridgedStore::new(TypedInvoker::new(&self.public, public_signatures()))
    }
}

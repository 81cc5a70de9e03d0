//! Public store reached through the stable bridge library.
//!
//! # Responsibility
//! - Translate store operations into calls on the stable surface.
//! - Probe every symbol before calling it.
//!
//! # Invariants
//! - The native store handle is created once per `BridgedStore`.
//! - Writes use `commit = false`; only `save` commits.

use super::{
    LiveList, LiveReminder, PublicStore, ReminderDraft, ReminderPatch, ReminderPredicate,
    StoreError, StoreResult,
};
use crate::bridge::invoker::TypedInvoker;
use crate::bridge::signature::{ek, symbol, SymbolRef};
use crate::bridge::value::{Handle, Value, ValueShape, MAYBE_FLOAT, MAYBE_HANDLE, MAYBE_TEXT};
use crate::bridge::BridgeError;
use crate::model::id::normalize_identifier;
use log::{debug, info};
use once_cell::sync::OnceCell;

/// Public store backed by native calls on the stable surface.
pub struct BridgedStore<'a> {
    invoker: TypedInvoker<'a>,
    store: OnceCell<Handle>,
}

impl<'a> BridgedStore<'a> {
    pub fn new(invoker: TypedInvoker<'a>) -> Self {
        Self {
            invoker,
            store: OnceCell::new(),
        }
    }

    fn call(&self, target: SymbolRef, args: &[Value], expected: ValueShape) -> StoreResult<Value> {
        let name = symbol(target);
        let capability = self.invoker.resolver().probe(&name);
        if !capability.available {
            return Err(StoreError::Bridge(BridgeError::CapabilityUnavailable {
                symbol: name.to_string(),
                reason: capability.reason_text().to_string(),
            }));
        }
        Ok(self.invoker.invoke(&name, args, expected)?)
    }

    fn handle(&self, target: SymbolRef, args: &[Value]) -> StoreResult<Handle> {
        let value = self.call(target, args, ValueShape::Handle)?;
        value.as_handle().ok_or_else(|| shape_error(target, "handle"))
    }

    fn maybe_handle(&self, target: SymbolRef, args: &[Value]) -> StoreResult<Option<Handle>> {
        Ok(self.call(target, args, MAYBE_HANDLE)?.as_handle())
    }

    fn text(&self, target: SymbolRef, receiver: Handle) -> StoreResult<String> {
        let value = self.call(target, &[Value::Handle(receiver)], ValueShape::Text)?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| shape_error(target, "text"))
    }

    fn maybe_text(&self, target: SymbolRef, receiver: Handle) -> StoreResult<Option<String>> {
        let value = self.call(target, &[Value::Handle(receiver)], MAYBE_TEXT)?;
        Ok(value.as_text().map(str::to_string))
    }

    fn flag(&self, target: SymbolRef, receiver: Handle) -> StoreResult<bool> {
        let value = self.call(target, &[Value::Handle(receiver)], ValueShape::Bool)?;
        value.as_bool().ok_or_else(|| shape_error(target, "bool"))
    }

    fn set(&self, target: SymbolRef, receiver: Handle, value: Value) -> StoreResult<()> {
        self.call(target, &[Value::Handle(receiver), value], ValueShape::Void)?;
        Ok(())
    }

    fn store_handle(&self) -> StoreResult<Handle> {
        self.store
            .get_or_try_init(|| {
                let handle = self.handle(ek::STORE_NEW, &[])?;
                info!("event=store_open module=store status=ok backend=bridged");
                Ok(handle)
            })
            .copied()
    }

    fn calendar_handles(&self) -> StoreResult<Vec<Handle>> {
        let store = self.store_handle()?;
        let value = self.call(
            ek::CALENDARS,
            &[Value::Handle(store), Value::Int(ek::ENTITY_TYPE_REMINDER)],
            ValueShape::HandleList,
        )?;
        value
            .into_handles()
            .ok_or_else(|| shape_error(ek::CALENDARS, "handle list"))
    }

    fn calendar_handle(&self, id: &str) -> StoreResult<Option<Handle>> {
        let store = self.store_handle()?;
        self.maybe_handle(
            ek::CALENDAR_WITH_ID,
            &[Value::Handle(store), Value::Text(id.trim().to_string())],
        )
    }

    fn reminder_handle(&self, id: &str) -> StoreResult<Option<Handle>> {
        let store = self.store_handle()?;
        self.maybe_handle(
            ek::ITEM_WITH_ID,
            &[Value::Handle(store), Value::Text(id.trim().to_string())],
        )
    }

    fn read_list(&self, calendar: Handle) -> StoreResult<LiveList> {
        Ok(LiveList {
            id: normalize_identifier(&self.text(ek::CALENDAR_ID, calendar)?),
            title: self.text(ek::CALENDAR_TITLE, calendar)?,
            writable: self.flag(ek::CALENDAR_WRITABLE, calendar)?,
        })
    }

    fn read_reminder(&self, reminder: Handle) -> StoreResult<LiveReminder> {
        let receiver = [Value::Handle(reminder)];
        let priority = self
            .call(ek::PRIORITY, &receiver, ValueShape::Int)?
            .as_int()
            .unwrap_or(0);
        let due_date = self.call(ek::DUE_DATE, &receiver, MAYBE_FLOAT)?.as_float();
        let list_id = match self.maybe_handle(ek::CALENDAR_OF, &receiver)? {
            Some(calendar) => Some(normalize_identifier(&self.text(ek::CALENDAR_ID, calendar)?)),
            None => None,
        };
        Ok(LiveReminder {
            id: normalize_identifier(&self.text(ek::IDENTIFIER, reminder)?),
            title: self.maybe_text(ek::TITLE, reminder)?,
            notes: self.maybe_text(ek::NOTES, reminder)?,
            completed: self.flag(ek::IS_COMPLETED, reminder)?,
            priority,
            due_date,
            list_id,
        })
    }

    fn apply_patch(&self, reminder: Handle, patch: &ReminderPatch) -> StoreResult<()> {
        if let Some(title) = &patch.title {
            self.set(ek::SET_TITLE, reminder, Value::Text(title.clone()))?;
        }
        if let Some(notes) = &patch.notes {
            self.set(ek::SET_NOTES, reminder, Value::Text(notes.clone()))?;
        }
        if let Some(completed) = patch.completed {
            self.set(ek::SET_COMPLETED, reminder, Value::Bool(completed))?;
        }
        if let Some(priority) = patch.priority {
            self.set(ek::SET_PRIORITY, reminder, Value::Int(priority))?;
        }
        if let Some(due_date) = patch.due_date {
            self.set(ek::SET_DUE_DATE, reminder, Value::Float(due_date))?;
        }
        Ok(())
    }

    fn stage_save(&self, reminder: Handle) -> StoreResult<()> {
        let store = self.store_handle()?;
        self.call(
            ek::SAVE_REMINDER,
            &[Value::Handle(store), Value::Handle(reminder), Value::Bool(false)],
            ValueShape::Void,
        )?;
        Ok(())
    }
}

fn shape_error(target: SymbolRef, wanted: &str) -> StoreError {
    StoreError::Bridge(BridgeError::ShapeMismatch {
        symbol: symbol(target).to_string(),
        detail: format!("expected {wanted} result"),
    })
}

impl PublicStore for BridgedStore<'_> {
    fn fetch_reminder(&self, id: &str) -> StoreResult<Option<LiveReminder>> {
        match self.reminder_handle(id)? {
            Some(handle) => self.read_reminder(handle).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_reminders(&self, predicate: &ReminderPredicate) -> StoreResult<Vec<LiveReminder>> {
        let calendars = match predicate {
            ReminderPredicate::All => self.calendar_handles()?,
            ReminderPredicate::InLists(ids) => {
                let mut handles = Vec::with_capacity(ids.len());
                for id in ids {
                    let handle = self
                        .calendar_handle(id)?
                        .ok_or_else(|| StoreError::ListNotFound(id.clone()))?;
                    handles.push(handle);
                }
                handles
            }
        };
        let store = self.store_handle()?;
        let filter = self.handle(
            ek::PREDICATE_IN_CALENDARS,
            &[Value::Handle(store), Value::HandleList(calendars)],
        )?;
        // Callback-dispatched; the invoker blocks until the completion fires.
        let matched = self
            .call(
                ek::FETCH_MATCHING,
                &[Value::Handle(store), Value::Handle(filter)],
                ValueShape::HandleList,
            )?
            .into_handles()
            .ok_or_else(|| shape_error(ek::FETCH_MATCHING, "handle list"))?;
        debug!(
            "event=store_fetch module=store status=ok backend=bridged count={}",
            matched.len()
        );
        matched
            .into_iter()
            .map(|handle| self.read_reminder(handle))
            .collect()
    }

    fn fetch_lists(&self) -> StoreResult<Vec<LiveList>> {
        self.calendar_handles()?
            .into_iter()
            .map(|calendar| self.read_list(calendar))
            .collect()
    }

    fn fetch_list(&self, id: &str) -> StoreResult<Option<LiveList>> {
        match self.calendar_handle(id)? {
            Some(calendar) => self.read_list(calendar).map(Some),
            None => Ok(None),
        }
    }

    fn create_reminder(&self, draft: &ReminderDraft) -> StoreResult<LiveReminder> {
        let calendar = self
            .calendar_handle(&draft.list_id)?
            .ok_or_else(|| StoreError::ListNotFound(draft.list_id.clone()))?;
        if !self.flag(ek::CALENDAR_WRITABLE, calendar)? {
            return Err(StoreError::ReadOnlyList(draft.list_id.clone()));
        }
        let store = self.store_handle()?;
        let reminder = self.handle(ek::NEW_REMINDER, &[Value::Handle(store)])?;
        self.set(ek::SET_CALENDAR, reminder, Value::Handle(calendar))?;
        let patch = ReminderPatch {
            title: Some(draft.title.clone()),
            notes: draft.notes.clone(),
            priority: draft.priority,
            due_date: draft.due_date,
            ..ReminderPatch::default()
        };
        self.apply_patch(reminder, &patch)?;
        self.stage_save(reminder)?;
        self.read_reminder(reminder)
    }

    fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<LiveReminder> {
        let reminder = self
            .reminder_handle(id)?
            .ok_or_else(|| StoreError::ReminderNotFound(id.to_string()))?;
        self.apply_patch(reminder, patch)?;
        self.stage_save(reminder)?;
        self.read_reminder(reminder)
    }

    fn delete_reminder(&self, id: &str) -> StoreResult<()> {
        let reminder = self
            .reminder_handle(id)?
            .ok_or_else(|| StoreError::ReminderNotFound(id.to_string()))?;
        let store = self.store_handle()?;
        self.call(
            ek::REMOVE_REMINDER,
            &[Value::Handle(store), Value::Handle(reminder), Value::Bool(false)],
            ValueShape::Void,
        )?;
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        let store = self.store_handle()?;
        self.call(ek::COMMIT, &[Value::Handle(store)], ValueShape::Void)?;
        info!("event=store_save module=store status=ok backend=bridged");
        Ok(())
    }
}

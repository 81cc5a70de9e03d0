//! Declared calling signatures for every native symbol the core may invoke.
//!
//! # Responsibility
//! - Keep one out-of-band signature table per native surface.
//! - Give the invoker the parameter and result shapes to check before
//!   any call crosses the native boundary.
//!
//! # Invariants
//! - Instance methods declare the receiver handle as their first parameter.
//! - A symbol missing from a table is never invoked.

use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{ValueShape, MAYBE_FLOAT, MAYBE_HANDLE, MAYBE_TEXT};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// `(entity, method)` pair as written in the tables below.
pub type SymbolRef = (&'static str, &'static str);

/// How a native entry returns its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Result is returned from the call itself.
    Direct,
    /// Result is delivered once through a completion callback.
    Callback,
}

/// Declared shape of one native entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub symbol: SymbolRef,
    pub params: &'static [ValueShape],
    pub result: ValueShape,
    pub dispatch: Dispatch,
}

impl Signature {
    const fn direct(symbol: SymbolRef, params: &'static [ValueShape], result: ValueShape) -> Self {
        Self {
            symbol,
            params,
            result,
            dispatch: Dispatch::Direct,
        }
    }

    const fn callback(
        symbol: SymbolRef,
        params: &'static [ValueShape],
        result: ValueShape,
    ) -> Self {
        Self {
            symbol,
            params,
            result,
            dispatch: Dispatch::Callback,
        }
    }

    pub fn name(&self) -> SymbolName {
        SymbolName::declared(self.symbol.0, self.symbol.1)
    }
}

/// Lookup table of declared signatures for one surface.
#[derive(Debug)]
pub struct SignatureTable {
    surface: &'static str,
    entries: HashMap<SymbolName, Signature>,
}

impl SignatureTable {
    pub fn from_slice(surface: &'static str, signatures: &[Signature]) -> Self {
        let entries = signatures
            .iter()
            .map(|signature| (signature.name(), *signature))
            .collect();
        Self { surface, entries }
    }

    pub fn surface(&self) -> &'static str {
        self.surface
    }

    pub fn get(&self, symbol: &SymbolName) -> Option<&Signature> {
        self.entries.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared symbols sorted by name.
    pub fn symbols(&self) -> Vec<SymbolName> {
        let mut symbols: Vec<SymbolName> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Undocumented object-graph surface.
pub mod rem {
    use super::SymbolRef;

    pub const STORE: &str = "REMStore";
    pub const SAVE_REQUEST: &str = "REMSaveRequest";
    pub const LIST_CHANGE: &str = "REMListChangeItem";
    pub const SECTIONS_CONTEXT: &str = "REMListSectionContextChangeItem";
    pub const SECTION_CHANGE: &str = "REMListSectionChangeItem";
    pub const REMINDER_CHANGE: &str = "REMReminderChangeItem";
    pub const SUBTASK_CONTEXT: &str = "REMReminderSubtaskContextChangeItem";
    pub const REMINDER_STORAGE: &str = "REMReminderStorage";
    pub const SECTION_STORAGE: &str = "REMListSectionStorage";
    pub const OBJECT_ID: &str = "REMObjectID";
    pub const MEMBERSHIP: &str = "REMMembership";
    pub const MEMBERSHIPS: &str = "REMMemberships";

    pub const STORE_NEW: SymbolRef = (STORE, "new");
    pub const FETCH_LIST: SymbolRef = (STORE, "fetchListWithExternalIdentifier:");
    pub const FETCH_REMINDER: SymbolRef = (STORE, "fetchReminderWithExternalIdentifier:");
    pub const FETCH_SECTION: SymbolRef = (STORE, "fetchListSectionWithExternalIdentifier:");

    pub const SAVE_REQUEST_INIT: SymbolRef = (SAVE_REQUEST, "initWithStore:");
    pub const UPDATE_LIST: SymbolRef = (SAVE_REQUEST, "updateList:");
    pub const UPDATE_REMINDER: SymbolRef = (SAVE_REQUEST, "updateReminder:");
    pub const UPDATE_SECTION: SymbolRef = (SAVE_REQUEST, "updateListSection:");
    pub const ADD_REMINDER_TO_LIST: SymbolRef =
        (SAVE_REQUEST, "addReminderWithTitle:toListChangeItem:");
    pub const ADD_REMINDER_TO_SUBTASKS: SymbolRef = (
        SAVE_REQUEST,
        "addReminderWithTitle:toReminderSubtaskContextChangeItem:",
    );
    pub const SAVE: SymbolRef = (SAVE_REQUEST, "saveSynchronouslyWithError:");

    pub const SECTIONS_CONTEXT_OF_LIST: SymbolRef = (LIST_CHANGE, "sectionsContextChangeItem");
    pub const SET_MEMBERSHIPS: SymbolRef =
        (SECTIONS_CONTEXT, "setMembershipsOfRemindersInSections:");

    pub const NEW_SECTION: SymbolRef = (
        SECTION_CHANGE,
        "initWithDisplayName:insertIntoListSectionContextChangeItem:",
    );
    pub const SECTION_SET_DISPLAY_NAME: SymbolRef = (SECTION_CHANGE, "setDisplayName:");
    pub const SECTION_REMOVE: SymbolRef = (SECTION_CHANGE, "removeFromList");
    pub const SECTION_OBJECT_ID: SymbolRef = (SECTION_CHANGE, "objectID");
    pub const SECTION_STORAGE_OF: SymbolRef = (SECTION_CHANGE, "storage");
    pub const SECTION_EXTERNAL_ID: SymbolRef = (SECTION_CHANGE, "externalIdentifier");
    pub const SECTION_STORAGE_OBJECT_ID: SymbolRef = (SECTION_STORAGE, "objectID");

    pub const SUBTASK_CONTEXT_OF: SymbolRef = (REMINDER_CHANGE, "subtaskContext");
    pub const REMINDER_SET_NOTES: SymbolRef = (REMINDER_CHANGE, "setNotes:");
    pub const REMINDER_SET_COMPLETED: SymbolRef = (REMINDER_CHANGE, "setCompleted:");
    pub const REMINDER_SET_PRIORITY: SymbolRef = (REMINDER_CHANGE, "setPriority:");
    pub const REMINDER_SET_DUE_DATE: SymbolRef = (REMINDER_CHANGE, "setDueDateTimestamp:");
    pub const REMINDER_REMOVE: SymbolRef = (REMINDER_CHANGE, "removeFromList");
    pub const REMINDER_OBJECT_ID: SymbolRef = (REMINDER_CHANGE, "objectID");
    pub const REMINDER_STORAGE_OF: SymbolRef = (REMINDER_CHANGE, "storage");
    pub const REMINDER_EXTERNAL_ID: SymbolRef = (REMINDER_CHANGE, "externalIdentifier");
    pub const REMINDER_STORAGE_OBJECT_ID: SymbolRef = (REMINDER_STORAGE, "objectID");

    pub const OBJECT_ID_UUID: SymbolRef = (OBJECT_ID, "uuidString");

    pub const NEW_MEMBERSHIP: SymbolRef = (
        MEMBERSHIP,
        "initWithMemberIdentifier:groupIdentifier:modifiedOn:",
    );
    pub const NEW_MEMBERSHIPS: SymbolRef = (MEMBERSHIPS, "initWithMemberships:");
}

/// Stable documented surface.
pub mod ek {
    use super::SymbolRef;

    pub const STORE: &str = "EKEventStore";
    pub const REMINDER: &str = "EKReminder";
    pub const CALENDAR: &str = "EKCalendar";

    /// Entity type argument selecting reminder calendars.
    pub const ENTITY_TYPE_REMINDER: i64 = 1;

    pub const STORE_NEW: SymbolRef = (STORE, "new");
    pub const CALENDARS: SymbolRef = (STORE, "calendarsForEntityType:");
    pub const CALENDAR_WITH_ID: SymbolRef = (STORE, "calendarWithIdentifier:");
    pub const ITEM_WITH_ID: SymbolRef = (STORE, "calendarItemWithIdentifier:");
    pub const PREDICATE_IN_CALENDARS: SymbolRef = (STORE, "predicateForRemindersInCalendars:");
    pub const FETCH_MATCHING: SymbolRef = (STORE, "fetchRemindersMatchingPredicate:completion:");
    pub const SAVE_REMINDER: SymbolRef = (STORE, "saveReminder:commit:");
    pub const REMOVE_REMINDER: SymbolRef = (STORE, "removeReminder:commit:");
    pub const COMMIT: SymbolRef = (STORE, "commit");

    pub const NEW_REMINDER: SymbolRef = (REMINDER, "reminderWithEventStore:");
    pub const IDENTIFIER: SymbolRef = (REMINDER, "calendarItemIdentifier");
    pub const TITLE: SymbolRef = (REMINDER, "title");
    pub const NOTES: SymbolRef = (REMINDER, "notes");
    pub const IS_COMPLETED: SymbolRef = (REMINDER, "isCompleted");
    pub const PRIORITY: SymbolRef = (REMINDER, "priority");
    pub const DUE_DATE: SymbolRef = (REMINDER, "dueDateTimestamp");
    pub const CALENDAR_OF: SymbolRef = (REMINDER, "calendar");
    pub const SET_TITLE: SymbolRef = (REMINDER, "setTitle:");
    pub const SET_NOTES: SymbolRef = (REMINDER, "setNotes:");
    pub const SET_COMPLETED: SymbolRef = (REMINDER, "setCompleted:");
    pub const SET_PRIORITY: SymbolRef = (REMINDER, "setPriority:");
    pub const SET_CALENDAR: SymbolRef = (REMINDER, "setCalendar:");
    pub const SET_DUE_DATE: SymbolRef = (REMINDER, "setDueDateTimestamp:");

    pub const CALENDAR_ID: SymbolRef = (CALENDAR, "calendarIdentifier");
    pub const CALENDAR_TITLE: SymbolRef = (CALENDAR, "title");
    pub const CALENDAR_WRITABLE: SymbolRef = (CALENDAR, "allowsContentModifications");
}

use ValueShape::{Bool, Float, Handle, HandleList, Int, Text, Void};

const PRIVATE_SIGNATURES: &[Signature] = &[
    Signature::direct(rem::STORE_NEW, &[], Handle),
    Signature::direct(rem::FETCH_LIST, &[Handle, Text], Handle),
    Signature::direct(rem::FETCH_REMINDER, &[Handle, Text], Handle),
    Signature::direct(rem::FETCH_SECTION, &[Handle, Text], Handle),
    Signature::direct(rem::SAVE_REQUEST_INIT, &[Handle], Handle),
    Signature::direct(rem::UPDATE_LIST, &[Handle, Handle], Handle),
    Signature::direct(rem::UPDATE_REMINDER, &[Handle, Handle], Handle),
    Signature::direct(rem::UPDATE_SECTION, &[Handle, Handle], Handle),
    Signature::direct(rem::ADD_REMINDER_TO_LIST, &[Handle, Text, Handle], Handle),
    Signature::direct(rem::ADD_REMINDER_TO_SUBTASKS, &[Handle, Text, Handle], Handle),
    Signature::direct(rem::SAVE, &[Handle], Void),
    Signature::direct(rem::SECTIONS_CONTEXT_OF_LIST, &[Handle], Handle),
    Signature::direct(rem::SET_MEMBERSHIPS, &[Handle, Handle], Void),
    Signature::direct(rem::NEW_SECTION, &[Text, Handle], Handle),
    Signature::direct(rem::SECTION_SET_DISPLAY_NAME, &[Handle, Text], Void),
    Signature::direct(rem::SECTION_REMOVE, &[Handle], Void),
    Signature::direct(rem::SECTION_OBJECT_ID, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::SECTION_STORAGE_OF, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::SECTION_EXTERNAL_ID, &[Handle], MAYBE_TEXT),
    Signature::direct(rem::SECTION_STORAGE_OBJECT_ID, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::SUBTASK_CONTEXT_OF, &[Handle], Handle),
    Signature::direct(rem::REMINDER_SET_NOTES, &[Handle, Text], Void),
    Signature::direct(rem::REMINDER_SET_COMPLETED, &[Handle, Bool], Void),
    Signature::direct(rem::REMINDER_SET_PRIORITY, &[Handle, Int], Void),
    Signature::direct(rem::REMINDER_SET_DUE_DATE, &[Handle, Float], Void),
    Signature::direct(rem::REMINDER_REMOVE, &[Handle], Void),
    Signature::direct(rem::REMINDER_OBJECT_ID, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::REMINDER_STORAGE_OF, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::REMINDER_EXTERNAL_ID, &[Handle], MAYBE_TEXT),
    Signature::direct(rem::REMINDER_STORAGE_OBJECT_ID, &[Handle], MAYBE_HANDLE),
    Signature::direct(rem::OBJECT_ID_UUID, &[Handle], MAYBE_TEXT),
    Signature::direct(rem::NEW_MEMBERSHIP, &[Text, Text, Float], Handle),
    Signature::direct(rem::NEW_MEMBERSHIPS, &[HandleList], Handle),
];

const PUBLIC_SIGNATURES: &[Signature] = &[
    Signature::direct(ek::STORE_NEW, &[], Handle),
    Signature::direct(ek::CALENDARS, &[Handle, Int], HandleList),
    Signature::direct(ek::CALENDAR_WITH_ID, &[Handle, Text], MAYBE_HANDLE),
    Signature::direct(ek::ITEM_WITH_ID, &[Handle, Text], MAYBE_HANDLE),
    Signature::direct(ek::PREDICATE_IN_CALENDARS, &[Handle, HandleList], Handle),
    Signature::callback(ek::FETCH_MATCHING, &[Handle, Handle], HandleList),
    Signature::direct(ek::SAVE_REMINDER, &[Handle, Handle, Bool], Void),
    Signature::direct(ek::REMOVE_REMINDER, &[Handle, Handle, Bool], Void),
    Signature::direct(ek::COMMIT, &[Handle], Void),
    Signature::direct(ek::NEW_REMINDER, &[Handle], Handle),
    Signature::direct(ek::IDENTIFIER, &[Handle], Text),
    Signature::direct(ek::TITLE, &[Handle], MAYBE_TEXT),
    Signature::direct(ek::NOTES, &[Handle], MAYBE_TEXT),
    Signature::direct(ek::IS_COMPLETED, &[Handle], Bool),
    Signature::direct(ek::PRIORITY, &[Handle], Int),
    Signature::direct(ek::DUE_DATE, &[Handle], MAYBE_FLOAT),
    Signature::direct(ek::CALENDAR_OF, &[Handle], MAYBE_HANDLE),
    Signature::direct(ek::SET_TITLE, &[Handle, Text], Void),
    Signature::direct(ek::SET_NOTES, &[Handle, Text], Void),
    Signature::direct(ek::SET_COMPLETED, &[Handle, Bool], Void),
    Signature::direct(ek::SET_PRIORITY, &[Handle, Int], Void),
    Signature::direct(ek::SET_CALENDAR, &[Handle, Handle], Void),
    Signature::direct(ek::SET_DUE_DATE, &[Handle, Float], Void),
    Signature::direct(ek::CALENDAR_ID, &[Handle], Text),
    Signature::direct(ek::CALENDAR_TITLE, &[Handle], Text),
    Signature::direct(ek::CALENDAR_WRITABLE, &[Handle], Bool),
];

static PRIVATE_TABLE: Lazy<SignatureTable> =
    Lazy::new(|| SignatureTable::from_slice("private", PRIVATE_SIGNATURES));
static PUBLIC_TABLE: Lazy<SignatureTable> =
    Lazy::new(|| SignatureTable::from_slice("public", PUBLIC_SIGNATURES));

/// Signatures of the undocumented object-graph surface.
pub fn private_signatures() -> &'static SignatureTable {
    &PRIVATE_TABLE
}

/// Signatures of the stable documented surface.
pub fn public_signatures() -> &'static SignatureTable {
    &PUBLIC_TABLE
}

/// Builds a symbol name from a table constant.
pub fn symbol(symbol: SymbolRef) -> SymbolName {
    SymbolName::declared(symbol.0, symbol.1)
}

#[cfg(test)]
mod tests {
    use super::{
        ek, private_signatures, public_signatures, rem, symbol, Dispatch, PRIVATE_SIGNATURES,
        PUBLIC_SIGNATURES,
    };
    use crate::bridge::value::ValueShape;

    #[test]
    fn declared_names_are_well_formed_and_unique() {
        for (table, slice) in [
            (private_signatures(), PRIVATE_SIGNATURES),
            (public_signatures(), PUBLIC_SIGNATURES),
        ] {
            assert_eq!(table.len(), slice.len(), "duplicate symbol in {}", table.surface());
            for name in table.symbols() {
                assert!(name.is_well_formed(), "malformed symbol {name}");
            }
        }
    }

    #[test]
    fn membership_setter_takes_wrapper_handle_not_list() {
        let signature = private_signatures()
            .get(&symbol(rem::SET_MEMBERSHIPS))
            .expect("setter declared");
        assert_eq!(signature.params, &[ValueShape::Handle, ValueShape::Handle]);
    }

    #[test]
    fn fetch_matching_is_callback_dispatched() {
        let signature = public_signatures()
            .get(&symbol(ek::FETCH_MATCHING))
            .expect("fetch declared");
        assert_eq!(signature.dispatch, Dispatch::Callback);
        assert_eq!(signature.result, ValueShape::HandleList);
    }
}

//! Identity extraction from committed result handles.
//!
//! # Responsibility
//! - Walk a fixed, ordered list of accessor paths to a stable identifier.
//! - Fall back to a tagged placeholder when every path fails.
//!
//! # Invariants
//! - The first path yielding a well-formed UUID wins.
//! - A placeholder is always marked `placeholder = true`.

use crate::bridge::invoker::TypedInvoker;
use crate::bridge::signature::{rem, symbol, SymbolRef};
use crate::bridge::value::{Handle, Value, MAYBE_HANDLE, MAYBE_TEXT};
use crate::graph::MutationError;
use crate::model::id::normalize_identifier;
use log::{debug, warn};
use serde::Serialize;
use uuid::Uuid;

/// Object family of a result handle; selects the accessor paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Reminder,
    Section,
}

/// Identifier of a mutated object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub value: String,
    /// `true` when generated locally because extraction failed.
    pub placeholder: bool,
}

impl Identity {
    pub fn external(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            placeholder: false,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            value: Uuid::new_v4().hyphenated().to_string().to_ascii_uppercase(),
            placeholder: true,
        }
    }
}

struct Path {
    label: &'static str,
    hops: &'static [SymbolRef],
}

const REMINDER_PATHS: &[Path] = &[
    Path {
        label: "objectID.uuidString",
        hops: &[rem::REMINDER_OBJECT_ID, rem::OBJECT_ID_UUID],
    },
    Path {
        label: "storage.objectID.uuidString",
        hops: &[
            rem::REMINDER_STORAGE_OF,
            rem::REMINDER_STORAGE_OBJECT_ID,
            rem::OBJECT_ID_UUID,
        ],
    },
    Path {
        label: "externalIdentifier",
        hops: &[rem::REMINDER_EXTERNAL_ID],
    },
];

const SECTION_PATHS: &[Path] = &[
    Path {
        label: "objectID.uuidString",
        hops: &[rem::SECTION_OBJECT_ID, rem::OBJECT_ID_UUID],
    },
    Path {
        label: "storage.objectID.uuidString",
        hops: &[
            rem::SECTION_STORAGE_OF,
            rem::SECTION_STORAGE_OBJECT_ID,
            rem::OBJECT_ID_UUID,
        ],
    },
    Path {
        label: "externalIdentifier",
        hops: &[rem::SECTION_EXTERNAL_ID],
    },
];

/// Recovers identifiers from result handles after a successful commit.
pub struct IdentityExtractor<'a> {
    invoker: TypedInvoker<'a>,
}

impl<'a> IdentityExtractor<'a> {
    pub fn new(invoker: TypedInvoker<'a>) -> Self {
        Self { invoker }
    }

    /// Returns the external identity, or `IdentityUnresolved` listing the
    /// paths tried.
    pub fn try_extract(&self, handle: Handle, kind: IdentityKind) -> Result<Identity, MutationError> {
        let paths = match kind {
            IdentityKind::Reminder => REMINDER_PATHS,
            IdentityKind::Section => SECTION_PATHS,
        };
        let mut attempts = Vec::with_capacity(paths.len());
        for path in paths {
            match self.walk(handle, path) {
                Some(value) => {
                    debug!(
                        "event=identity_extract module=graph status=ok kind={:?} path={}",
                        kind, path.label
                    );
                    return Ok(Identity::external(value));
                }
                None => attempts.push(path.label.to_string()),
            }
        }
        Err(MutationError::IdentityUnresolved { attempts })
    }

    /// Like `try_extract`, but falls back to a tagged placeholder.
    pub fn extract(&self, handle: Handle, kind: IdentityKind) -> Identity {
        match self.try_extract(handle, kind) {
            Ok(identity) => identity,
            Err(err) => {
                let identity = Identity::placeholder();
                warn!(
                    "event=identity_extract module=graph status=placeholder kind={:?} error_code={} placeholder={}",
                    kind,
                    err.kind(),
                    identity.value
                );
                identity
            }
        }
    }

    fn walk(&self, start: Handle, path: &Path) -> Option<String> {
        let mut current = Value::Handle(start);
        let last = path.hops.len().saturating_sub(1);
        for (index, hop) in path.hops.iter().enumerate() {
            let name = symbol(*hop);
            if !self.invoker.resolver().probe(&name).available {
                return None;
            }
            let expected = if index == last { MAYBE_TEXT } else { MAYBE_HANDLE };
            current = self.invoker.invoke(&name, &[current], expected).ok()?;
            if current.is_nil() {
                return None;
            }
        }
        match current {
            Value::Text(text) => well_formed(&text),
            _ => None,
        }
    }
}

/// Normalized UUID text when `raw` holds one.
fn well_formed(raw: &str) -> Option<String> {
    let normalized = normalize_identifier(raw);
    Uuid::parse_str(&normalized)
        .ok()
        .map(|uuid| uuid.hyphenated().to_string().to_ascii_uppercase())
}

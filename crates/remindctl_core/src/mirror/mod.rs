//! Read-only access to the host's relational mirror files.
//!
//! # Responsibility
//! - Discover mirror files and open them read-only.
//! - Extract parent links, display order, sections and membership sets.
//!
//! # Invariants
//! - Mirror files are never written.
//! - Connections live for a single read call.
//! - Malformed rows and unreadable files are skipped, never fatal.

use crate::error::ErrorKind;
use crate::model::membership::Membership;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod open;
mod reader;

pub use open::{discover_mirror_files, open_mirror};
pub use reader::MirrorReader;

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Mirror read failures. Absorbed per row or per file by the reader.
#[derive(Debug)]
pub enum MirrorError {
    /// Mirror directory could not be listed.
    Io { path: PathBuf, source: std::io::Error },
    Open { path: PathBuf, source: rusqlite::Error },
    Query { path: PathBuf, table: &'static str, source: rusqlite::Error },
    MalformedRow { path: PathBuf, table: &'static str, detail: String },
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MirrorReadError
    }
}

impl Display for MirrorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot list mirror directory `{}`: {source}", path.display())
            }
            Self::Open { path, source } => {
                write!(f, "cannot open mirror `{}`: {source}", path.display())
            }
            Self::Query {
                path,
                table,
                source,
            } => write!(f, "cannot read {table} from `{}`: {source}", path.display()),
            Self::MalformedRow {
                path,
                table,
                detail,
            } => write!(f, "malformed {table} row in `{}`: {detail}", path.display()),
        }
    }
}

impl Error for MirrorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Open { source, .. } | Self::Query { source, .. } => Some(source),
            Self::MalformedRow { .. } => None,
        }
    }
}

/// Which record families to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorSelector {
    Items,
    Containers,
    Sections,
    All,
}

impl MirrorSelector {
    pub(crate) fn includes_items(self) -> bool {
        matches!(self, Self::Items | Self::All)
    }

    pub(crate) fn includes_containers(self) -> bool {
        matches!(self, Self::Containers | Self::All)
    }

    pub(crate) fn includes_sections(self) -> bool {
        matches!(self, Self::Sections | Self::All)
    }
}

/// Task row with its relational facts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub list_id: Option<String>,
    pub display_order: Option<i64>,
    pub title: Option<String>,
    pub completed: bool,
}

/// List row with sharing status and its membership set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: Option<String>,
    pub sharing_status: i64,
    pub membership_version: Option<i64>,
    pub memberships: Vec<Membership>,
}

/// Section row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRecord {
    pub id: String,
    pub display_name: String,
    pub list_id: Option<String>,
}

/// One snapshot row read from the mirror. Identifiers are normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum MirrorRecord {
    Item(ItemRecord),
    Container(ContainerRecord),
    Section(SectionRecord),
}

impl MirrorRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::Item(item) => &item.id,
            Self::Container(container) => &container.id,
            Self::Section(section) => &section.id,
        }
    }
}

/// Records of one read call plus the problems absorbed on the way.
#[derive(Debug, Default)]
pub struct MirrorSnapshot {
    pub records: Vec<MirrorRecord>,
    pub files_read: usize,
    pub skipped_rows: usize,
    pub file_errors: Vec<MirrorError>,
}

impl MirrorSnapshot {
    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.records.iter().filter_map(|record| match record {
            MirrorRecord::Item(item) => Some(item),
            _ => None,
        })
    }

    pub fn containers(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.records.iter().filter_map(|record| match record {
            MirrorRecord::Container(container) => Some(container),
            _ => None,
        })
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionRecord> {
        self.records.iter().filter_map(|record| match record {
            MirrorRecord::Section(section) => Some(section),
            _ => None,
        })
    }

    /// Container record for `list_id` (normalized), if mirrored.
    pub fn container(&self, list_id: &str) -> Option<&ContainerRecord> {
        self.containers().find(|container| container.id == list_id)
    }

    /// Section record for `section_id` (normalized), if mirrored.
    pub fn section(&self, section_id: &str) -> Option<&SectionRecord> {
        self.sections().find(|section| section.id == section_id)
    }
}

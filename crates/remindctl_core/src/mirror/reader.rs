//! Relational mirror reader.
//!
//! # Responsibility
//! - Run the fixed read queries against every discovered mirror file.
//! - Decode rows into normalized `MirrorRecord`s.
//!
//! # Invariants
//! - A row missing its identifier or carrying a bad membership blob is
//!   skipped and counted.
//! - A file that cannot be opened or queried is recorded and skipped.
//! - Reads never overlap a transaction of this process.

use super::open::{discover_mirror_files, open_mirror};
use super::{
    ContainerRecord, ItemRecord, MirrorError, MirrorRecord, MirrorSelector, MirrorSnapshot,
    SectionRecord,
};
use crate::graph::lock_transactions;
use crate::model::id::normalize_identifier;
use crate::model::membership::MembershipSet;
use log::{info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use std::time::Instant;

const ITEMS_TABLE: &str = "ZREMCDREMINDER";
const CONTAINERS_TABLE: &str = "ZREMCDBASELIST";
const SECTIONS_TABLE: &str = "ZREMCDBASESECTION";

const ITEMS_SQL: &str = "
SELECT r.ZCKIDENTIFIER, p.ZCKIDENTIFIER, l.ZCKIDENTIFIER, r.ZICSDISPLAYORDER, r.ZTITLE, r.ZCOMPLETED
FROM ZREMCDREMINDER r
LEFT JOIN ZREMCDREMINDER p ON p.Z_PK = r.ZPARENTREMINDER
LEFT JOIN ZREMCDBASELIST l ON l.Z_PK = r.ZLIST
WHERE COALESCE(r.ZMARKEDFORDELETION, 0) = 0
ORDER BY r.Z_PK ASC;";

const CONTAINERS_SQL: &str = "
SELECT ZCKIDENTIFIER, ZNAME, ZSHARINGSTATUS, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA
FROM ZREMCDBASELIST
WHERE COALESCE(ZMARKEDFORDELETION, 0) = 0
ORDER BY Z_PK ASC;";

const SECTIONS_SQL: &str = "
SELECT s.ZCKIDENTIFIER, s.ZDISPLAYNAME, l.ZCKIDENTIFIER
FROM ZREMCDBASESECTION s
LEFT JOIN ZREMCDBASELIST l ON l.Z_PK = s.ZLIST
WHERE COALESCE(s.ZMARKEDFORDELETION, 0) = 0
ORDER BY s.Z_PK ASC;";

type Decoder = fn(&Row<'_>) -> Result<MirrorRecord, String>;

/// Reads snapshots from every mirror file under one directory.
#[derive(Debug, Clone)]
pub struct MirrorReader {
    dir: PathBuf,
    extension: String,
}

impl MirrorReader {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads the selected record families from all mirror files.
    pub fn read_records(&self, selector: MirrorSelector) -> Vec<MirrorRecord> {
        self.read_snapshot(selector).records
    }

    /// Like `read_records`, also reporting absorbed problems.
    pub fn read_snapshot(&self, selector: MirrorSelector) -> MirrorSnapshot {
        let _gate = lock_transactions();
        let started_at = Instant::now();
        let mut snapshot = MirrorSnapshot::default();

        let files = match discover_mirror_files(&self.dir, &self.extension) {
            Ok(files) => files,
            Err(err) => {
                warn!(
                    "event=mirror_read module=mirror status=error error_code={} error={}",
                    err.kind(),
                    err
                );
                snapshot.file_errors.push(err);
                return snapshot;
            }
        };

        for path in files {
            match open_mirror(&path) {
                Ok(conn) => {
                    read_file(&conn, &path, selector, &mut snapshot);
                    snapshot.files_read += 1;
                }
                Err(err) => {
                    warn!(
                        "event=mirror_read module=mirror status=skipped error_code={} error={}",
                        err.kind(),
                        err
                    );
                    snapshot.file_errors.push(err);
                }
            }
        }

        info!(
            "event=mirror_read module=mirror status=ok files={} records={} skipped_rows={} file_errors={} duration_ms={}",
            snapshot.files_read,
            snapshot.records.len(),
            snapshot.skipped_rows,
            snapshot.file_errors.len(),
            started_at.elapsed().as_millis()
        );
        snapshot
    }
}

fn read_file(conn: &Connection, path: &Path, selector: MirrorSelector, snapshot: &mut MirrorSnapshot) {
    if selector.includes_containers() {
        read_table(conn, path, CONTAINERS_TABLE, CONTAINERS_SQL, decode_container, snapshot);
    }
    if selector.includes_sections() {
        read_table(conn, path, SECTIONS_TABLE, SECTIONS_SQL, decode_section, snapshot);
    }
    if selector.includes_items() {
        read_table(conn, path, ITEMS_TABLE, ITEMS_SQL, decode_item, snapshot);
    }
}

fn read_table(
    conn: &Connection,
    path: &Path,
    table: &'static str,
    sql: &str,
    decode: Decoder,
    snapshot: &mut MirrorSnapshot,
) {
    let query_error = |source| MirrorError::Query {
        path: path.to_path_buf(),
        table,
        source,
    };
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(source) => {
            let err = query_error(source);
            warn!(
                "event=mirror_query module=mirror status=skipped table={table} error_code={}",
                err.kind()
            );
            snapshot.file_errors.push(err);
            return;
        }
    };
    let rows = match stmt.query_map([], |row| Ok(decode(row))) {
        Ok(rows) => rows,
        Err(source) => {
            snapshot.file_errors.push(query_error(source));
            return;
        }
    };

    for row in rows {
        let decoded = row.map_err(|err| err.to_string()).and_then(|record| record);
        match decoded {
            Ok(record) => snapshot.records.push(record),
            Err(detail) => {
                let err = MirrorError::MalformedRow {
                    path: path.to_path_buf(),
                    table,
                    detail,
                };
                warn!(
                    "event=mirror_row module=mirror status=skipped table={table} error_code={} error={}",
                    err.kind(),
                    err
                );
                snapshot.skipped_rows += 1;
            }
        }
    }
}

fn column<T: rusqlite::types::FromSql>(row: &Row<'_>, index: usize) -> Result<T, String> {
    row.get(index)
        .map_err(|err| format!("column {index}: {err}"))
}

fn required_id(row: &Row<'_>, index: usize) -> Result<String, String> {
    let raw: Option<String> = column(row, index)?;
    let id = raw.map(|value| normalize_identifier(&value)).unwrap_or_default();
    if id.is_empty() {
        return Err("missing identifier".to_string());
    }
    Ok(id)
}

fn optional_id(row: &Row<'_>, index: usize) -> Result<Option<String>, String> {
    let raw: Option<String> = column(row, index)?;
    Ok(raw
        .map(|value| normalize_identifier(&value))
        .filter(|value| !value.is_empty()))
}

fn decode_item(row: &Row<'_>) -> Result<MirrorRecord, String> {
    let completed: Option<i64> = column(row, 5)?;
    Ok(MirrorRecord::Item(ItemRecord {
        id: required_id(row, 0)?,
        parent_id: optional_id(row, 1)?,
        list_id: optional_id(row, 2)?,
        display_order: column(row, 3)?,
        title: column(row, 4)?,
        completed: completed.unwrap_or(0) != 0,
    }))
}

fn decode_container(row: &Row<'_>) -> Result<MirrorRecord, String> {
    let id = required_id(row, 0)?;
    let sharing_status: Option<i64> = column(row, 2)?;
    let blob = row
        .get_ref(3)
        .map_err(|err| format!("column 3: {err}"))?;
    let set = match blob {
        ValueRef::Null => None,
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(
            MembershipSet::from_blob(bytes)
                .map_err(|err| format!("membership blob: {err}"))?,
        ),
        _ => return Err("membership blob has unexpected column type".to_string()),
    };
    Ok(MirrorRecord::Container(ContainerRecord {
        id,
        name: column(row, 1)?,
        sharing_status: sharing_status.unwrap_or(0),
        membership_version: set.as_ref().map(|set| set.minimum_supported_version),
        memberships: set.map(|set| set.memberships).unwrap_or_default(),
    }))
}

fn decode_section(row: &Row<'_>) -> Result<MirrorRecord, String> {
    let id = required_id(row, 0)?;
    let display_name: Option<String> = column(row, 1)?;
    let display_name = display_name.ok_or_else(|| "missing display name".to_string())?;
    Ok(MirrorRecord::Section(SectionRecord {
        id,
        display_name,
        list_id: optional_id(row, 2)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::MirrorReader;
    use crate::mirror::{MirrorRecord, MirrorSelector};
    use rusqlite::{params, Connection};

    const SCHEMA: &str = "
        CREATE TABLE ZREMCDBASELIST (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZNAME TEXT,
            ZSHARINGSTATUS INTEGER, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA BLOB, ZMARKEDFORDELETION INTEGER);
        CREATE TABLE ZREMCDBASESECTION (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZDISPLAYNAME TEXT,
            ZLIST INTEGER, ZMARKEDFORDELETION INTEGER);
        CREATE TABLE ZREMCDREMINDER (Z_PK INTEGER PRIMARY KEY, ZCKIDENTIFIER TEXT, ZPARENTREMINDER INTEGER,
            ZLIST INTEGER, ZICSDISPLAYORDER INTEGER, ZTITLE TEXT, ZCOMPLETED INTEGER, ZMARKEDFORDELETION INTEGER);";

    #[test]
    fn resolves_parent_and_list_through_row_keys() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("Data-1.sqlite")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO ZREMCDBASELIST (Z_PK, ZCKIDENTIFIER, ZNAME, ZSHARINGSTATUS) VALUES (1, 'list-a', 'Home', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ZREMCDREMINDER (Z_PK, ZCKIDENTIFIER, ZLIST, ZICSDISPLAYORDER) VALUES (10, 'parent', 1, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ZREMCDREMINDER (Z_PK, ZCKIDENTIFIER, ZPARENTREMINDER, ZLIST, ZICSDISPLAYORDER, ZCOMPLETED)
             VALUES (?1, ?2, 10, 1, 3, 1)",
            params![11, "child"],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ZREMCDREMINDER (Z_PK, ZCKIDENTIFIER, ZMARKEDFORDELETION) VALUES (12, 'gone', 1)",
            [],
        )
        .unwrap();
        drop(conn);

        let snapshot = MirrorReader::new(dir.path(), "sqlite").read_snapshot(MirrorSelector::All);
        assert_eq!(snapshot.files_read, 1);
        let child = snapshot.items().find(|item| item.id == "CHILD").expect("child row");
        assert_eq!(child.parent_id.as_deref(), Some("PARENT"));
        assert_eq!(child.list_id.as_deref(), Some("LIST-A"));
        assert_eq!(child.display_order, Some(3));
        assert!(child.completed);
        assert!(snapshot.items().all(|item| item.id != "GONE"));
        assert_eq!(snapshot.container("LIST-A").map(|c| c.sharing_status), Some(1));
    }

    #[test]
    fn bad_membership_blob_skips_only_that_row() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("Data-1.sqlite")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO ZREMCDBASELIST (Z_PK, ZCKIDENTIFIER, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA) VALUES (1, 'ok', ?1)",
            params![br#"{"minimumSupportedVersion":1,"memberships":[{"memberID":"t","groupID":"s","modifiedOn":1.0}]}"#.to_vec()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ZREMCDBASELIST (Z_PK, ZCKIDENTIFIER, ZMEMBERSHIPSOFREMINDERSINSECTIONSASDATA) VALUES (2, 'bad', 'not json')",
            [],
        )
        .unwrap();
        drop(conn);

        let snapshot =
            MirrorReader::new(dir.path(), "sqlite").read_snapshot(MirrorSelector::Containers);
        assert_eq!(snapshot.skipped_rows, 1);
        assert_eq!(snapshot.records.len(), 1);
        match &snapshot.records[0] {
            MirrorRecord::Container(container) => {
                assert_eq!(container.memberships.len(), 1);
                assert_eq!(container.memberships[0].group_id, "S");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unreadable_file_does_not_abort_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.sqlite"), b"this is not a database").unwrap();
        let conn = Connection::open(dir.path().join("B.sqlite")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO ZREMCDBASESECTION (Z_PK, ZCKIDENTIFIER, ZDISPLAYNAME) VALUES (1, 's1', 'Groceries')",
            [],
        )
        .unwrap();
        drop(conn);

        let snapshot =
            MirrorReader::new(dir.path(), "sqlite").read_snapshot(MirrorSelector::Sections);
        assert!(!snapshot.file_errors.is_empty());
        assert_eq!(snapshot.sections().count(), 1);
    }
}

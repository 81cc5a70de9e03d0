//! Mirror file discovery and read-only connection bootstrap.

use super::{MirrorError, MirrorResult};
use log::{debug, error};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lists files with `extension` directly under `dir`, sorted by path.
///
/// A missing directory yields an empty list; the mirror is optional.
pub fn discover_mirror_files(dir: &Path, extension: &str) -> MirrorResult<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(
            "event=mirror_discover module=mirror status=skipped reason=missing_dir dir={}",
            dir.display()
        );
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| MirrorError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let wanted = extension.trim_start_matches('.');
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Opens one mirror file read-only.
///
/// # Side effects
/// - Emits `mirror_open` logging events with duration and status.
pub fn open_mirror(path: &Path) -> MirrorResult<Connection> {
    let started_at = Instant::now();
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(path, flags)
        .and_then(|conn| {
            conn.busy_timeout(Duration::from_secs(2))?;
            conn.execute_batch("PRAGMA query_only = ON;")?;
            Ok(conn)
        })
        .map_err(|source| {
            error!(
                "event=mirror_open module=mirror status=error duration_ms={} error_code=mirror_open_failed error={}",
                started_at.elapsed().as_millis(),
                source
            );
            MirrorError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;

    debug!(
        "event=mirror_open module=mirror status=ok duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

//! Local SQLite index of note metadata and content.
//!
//! The index is a cache derived from the working tree. `rebuild` replaces it
//! wholesale inside one transaction; `upsert_path` / `remove_path` keep it
//! current between rebuilds. A `TreeFingerprint` of the note files is stored
//! as the rebuild watermark so `update_if_needed` can skip unchanged trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use notes_fs::{extract_tags, extract_title, folder_of, has_note_extension, note_name, parse_frontmatter};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::state::CancelFlag;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS notes (
        path        TEXT PRIMARY KEY,
        folder      TEXT NOT NULL,
        name        TEXT NOT NULL,
        title       TEXT,
        tags        TEXT NOT NULL DEFAULT '[]',
        content     TEXT NOT NULL,
        modified_ms INTEGER NOT NULL,
        size        INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE INDEX IF NOT EXISTS notes_folder ON notes(folder);
    CREATE TABLE IF NOT EXISTS skipped (
        path   TEXT PRIMARY KEY,
        reason TEXT NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    ) WITHOUT ROWID;
";

const STAGING_SCHEMA: &str = "
    DROP TABLE IF EXISTS notes_staging;
    CREATE TABLE notes_staging (
        path        TEXT PRIMARY KEY,
        folder      TEXT NOT NULL,
        name        TEXT NOT NULL,
        title       TEXT,
        tags        TEXT NOT NULL DEFAULT '[]',
        content     TEXT NOT NULL,
        modified_ms INTEGER NOT NULL,
        size        INTEGER NOT NULL
    ) WITHOUT ROWID;
";

const SWAP_STAGING: &str = "
    DELETE FROM notes;
    INSERT INTO notes (path, folder, name, title, tags, content, modified_ms, size)
        SELECT path, folder, name, title, tags, content, modified_ms, size FROM notes_staging;
    DROP TABLE notes_staging;
    DELETE FROM skipped;
";

const RECORD_COLUMNS: &str = "path, folder, name, title, tags, content, modified_ms, size";
const FINGERPRINT_KEY: &str = "tree_fingerprint";

/// Index row for one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub path: String,
    pub folder: String,
    pub name: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub content: String,
    pub last_modified_millis: i64,
    pub size: u64,
}

/// A note file the index could not take in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Cheap summary of the note files on disk, compared against the stored
/// watermark to decide whether a rebuild is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeFingerprint {
    pub files: u64,
    pub newest_mtime_ms: i64,
    pub total_bytes: u64,
    /// SHA-256 of the sorted path list, so renames are noticed.
    pub paths_digest: String,
}

impl TreeFingerprint {
    fn from_files(files: &[ScannedFile]) -> Self {
        let mut hasher = Sha256::new();
        for file in files {
            hasher.update(file.rel.as_bytes());
            hasher.update([0u8]);
        }
        Self {
            files: files.len() as u64,
            newest_mtime_ms: files.iter().map(|f| f.modified_ms).max().unwrap_or(0),
            total_bytes: files.iter().map(|f| f.size).sum(),
            paths_digest: hex::encode(hasher.finalize()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub indexed: usize,
    /// Records dropped because their file is gone.
    pub removed: usize,
    pub skipped: Vec<SkippedFile>,
    pub fingerprint: TreeFingerprint,
}

#[derive(Debug)]
struct ScannedFile {
    rel: String,
    abs: PathBuf,
    size: u64,
    modified_ms: i64,
}

pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
    extensions: Vec<String>,
}

impl IndexStore {
    /// Open (or create) the index database at `db_path`.
    pub fn open(db_path: &Path, extensions: Vec<String>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        // A crash mid-rebuild can leave the staging table behind.
        conn.execute_batch("DROP TABLE IF EXISTS notes_staging;")?;

        debug!("Opened index at {}", db_path.display());
        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
            extensions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a relative path is something the index tracks.
    pub fn is_note_path(&self, rel: &str) -> bool {
        !notes_fs::is_hidden_path(rel) && has_note_extension(rel, &self.extensions)
    }

    /// Fingerprint of the note files currently on disk.
    pub fn fingerprint(&self, root: &Path) -> Result<TreeFingerprint, StoreError> {
        Ok(TreeFingerprint::from_files(&scan(root, &self.extensions)?))
    }

    /// Fingerprint recorded by the last successful rebuild.
    pub fn stored_fingerprint(&self) -> Result<Option<TreeFingerprint>, StoreError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![FINGERPRINT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| serde_json::from_str(&v).ok()))
    }

    /// Rebuild from scratch. On error or cancellation the previous index is
    /// left exactly as it was.
    pub fn rebuild(&mut self, root: &Path, cancel: &CancelFlag) -> Result<RebuildReport, StoreError> {
        let files = scan(root, &self.extensions)?;
        self.rebuild_from(files, cancel)
    }

    /// Rebuild only when the tree fingerprint differs from the watermark.
    pub fn update_if_needed(&mut self, root: &Path, cancel: &CancelFlag) -> Result<bool, StoreError> {
        let files = scan(root, &self.extensions)?;
        let current = TreeFingerprint::from_files(&files);
        if self.stored_fingerprint()?.as_ref() == Some(&current) {
            debug!("Index is up to date ({} files)", current.files);
            return Ok(false);
        }
        self.rebuild_from(files, cancel)?;
        Ok(true)
    }

    fn rebuild_from(
        &mut self,
        files: Vec<ScannedFile>,
        cancel: &CancelFlag,
    ) -> Result<RebuildReport, StoreError> {
        let fingerprint = TreeFingerprint::from_files(&files);
        let tx = self.conn.transaction()?;
        tx.execute_batch(STAGING_SCHEMA)?;

        let mut indexed = 0;
        let mut skipped = Vec::new();
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO notes_staging ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for file in &files {
                cancel.ensure_not_cancelled()?;
                match read_record(file) {
                    Ok(Some(record)) => {
                        insert.execute(record_params(&record))?;
                        indexed += 1;
                    }
                    Ok(None) => {}
                    Err(StoreError::Corruption { path, reason }) => {
                        warn!("Skipping {}: {}", path, reason);
                        skipped.push(SkippedFile { path, reason });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let removed: i64 = tx.query_row(
            "SELECT COUNT(*) FROM notes WHERE path NOT IN (SELECT path FROM notes_staging)",
            [],
            |row| row.get(0),
        )?;
        tx.execute_batch(SWAP_STAGING)?;
        for skip in &skipped {
            tx.execute(
                "INSERT OR REPLACE INTO skipped (path, reason) VALUES (?1, ?2)",
                params![skip.path, skip.reason],
            )?;
        }
        let watermark = serde_json::to_string(&fingerprint).unwrap_or_default();
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![FINGERPRINT_KEY, watermark],
        )?;
        tx.commit()?;

        info!(
            "Index rebuilt: {} notes, {} removed, {} skipped",
            indexed,
            removed,
            skipped.len()
        );
        Ok(RebuildReport {
            indexed,
            removed: removed as usize,
            skipped,
            fingerprint,
        })
    }

    /// Re-read one file into the index. Returns whether it is now indexed.
    ///
    /// Does not move the rebuild watermark.
    pub fn upsert_path(&mut self, root: &Path, rel: &str) -> Result<bool, StoreError> {
        if !self.is_note_path(rel) {
            return Ok(false);
        }
        let abs = root.join(rel);
        let metadata = match fs::metadata(&abs) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_path(rel)?;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let file = ScannedFile {
            rel: rel.to_string(),
            abs,
            size: metadata.len(),
            modified_ms: modified_ms(&metadata),
        };
        let tx = self.conn.transaction()?;
        let indexed = upsert_scanned(&tx, &file)?;
        tx.commit()?;
        Ok(indexed)
    }

    /// Drop the record for a path. Returns whether a record existed.
    pub fn remove_path(&mut self, rel: &str) -> Result<bool, StoreError> {
        let deleted = self.conn.execute("DELETE FROM notes WHERE path = ?1", params![rel])?;
        self.conn
            .execute("DELETE FROM skipped WHERE path = ?1", params![rel])?;
        Ok(deleted > 0)
    }

    /// Re-sync every record at or below `prefix` with the files on disk.
    pub fn refresh_prefix(&mut self, root: &Path, prefix: &str) -> Result<(), StoreError> {
        let prefix = prefix.trim_end_matches('/');
        let pattern = format!("{}/%", escape_like(prefix));
        let files: Vec<ScannedFile> = scan(root, &self.extensions)?
            .into_iter()
            .filter(|f| f.rel == prefix || f.rel.starts_with(&format!("{}/", prefix)))
            .collect();

        let tx = self.conn.transaction()?;
        for table in ["notes", "skipped"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'"),
                params![prefix, pattern],
            )?;
        }
        for file in &files {
            upsert_scanned(&tx, file)?;
        }
        tx.commit()?;
        debug!("Refreshed {} index entries under {}", files.len(), prefix);
        Ok(())
    }

    pub fn record_for_path(&self, rel: &str) -> Result<Option<IndexRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM notes WHERE path = ?1"),
                params![rel],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Notes directly inside `folder` (`""` is the root), by path.
    pub fn list_folder(&self, folder: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let folder = folder.trim_matches('/');
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM notes WHERE folder = ?1 ORDER BY path"
        ))?;
        let rows = stmt.query_map(params![folder], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Case-insensitive substring search over path, title, tags and content,
    /// most recently modified first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<IndexRecord>, StoreError> {
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM notes
             WHERE path LIKE ?1 ESCAPE '\\' OR title LIKE ?1 ESCAPE '\\'
                OR tags LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\'
             ORDER BY modified_ms DESC, path
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn all_paths(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT path FROM notes ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn skipped(&self) -> Result<Vec<SkippedFile>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, reason FROM skipped ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok(SkippedFile {
                path: row.get(0)?,
                reason: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Note files under `root`, sorted by path. Hidden entries are not entered.
fn scan(root: &Path, extensions: &[String]) -> Result<Vec<ScannedFile>, StoreError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root).ok().and_then(Path::to_str) {
            Some(rel) => rel.replace('\\', "/"),
            None => {
                warn!("Ignoring non UTF-8 file name: {}", entry.path().display());
                continue;
            }
        };
        if !has_note_extension(&rel, extensions) {
            continue;
        }
        let metadata = entry.metadata()?;
        files.push(ScannedFile {
            rel,
            abs: entry.path().to_path_buf(),
            size: metadata.len(),
            modified_ms: modified_ms(&metadata),
        });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

fn modified_ms(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `Ok(None)` if the file disappeared since it was scanned.
fn read_record(file: &ScannedFile) -> Result<Option<IndexRecord>, StoreError> {
    let bytes = match fs::read(&file.abs) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let content = String::from_utf8(bytes).map_err(|e| StoreError::Corruption {
        path: file.rel.clone(),
        reason: format!("not valid UTF-8: {}", e.utf8_error()),
    })?;

    let parsed = parse_frontmatter(&content);
    let title = extract_title(&parsed);
    let tags = extract_tags(&parsed);

    Ok(Some(IndexRecord {
        folder: folder_of(&file.rel).to_string(),
        name: note_name(&file.rel).to_string(),
        path: file.rel.clone(),
        title,
        tags,
        last_modified_millis: file.modified_ms,
        size: file.size,
        content,
    }))
}

/// Insert or replace one record, tracking unreadable files in `skipped`.
fn upsert_scanned(conn: &Connection, file: &ScannedFile) -> Result<bool, StoreError> {
    match read_record(file) {
        Ok(Some(record)) => {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO notes ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                record_params(&record),
            )?;
            conn.execute("DELETE FROM skipped WHERE path = ?1", params![record.path])?;
            Ok(true)
        }
        Ok(None) => {
            conn.execute("DELETE FROM notes WHERE path = ?1", params![file.rel])?;
            Ok(false)
        }
        Err(StoreError::Corruption { path, reason }) => {
            warn!("Skipping {}: {}", path, reason);
            conn.execute("DELETE FROM notes WHERE path = ?1", params![path])?;
            conn.execute(
                "INSERT OR REPLACE INTO skipped (path, reason) VALUES (?1, ?2)",
                params![path, reason],
            )?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn record_params(record: &IndexRecord) -> impl rusqlite::Params + '_ {
    let tags = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string());
    (
        record.path.as_str(),
        record.folder.as_str(),
        record.name.as_str(),
        record.title.as_deref(),
        tags,
        record.content.as_str(),
        record.last_modified_millis,
        record.size as i64,
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
    let tags: String = row.get(4)?;
    let size: i64 = row.get(7)?;
    Ok(IndexRecord {
        path: row.get(0)?,
        folder: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        content: row.get(5)?,
        last_modified_millis: row.get(6)?,
        size: size.max(0) as u64,
    })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

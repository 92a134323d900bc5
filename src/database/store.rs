use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::database::diff::{diff_fields, FieldChange};
use crate::database::functions;
use crate::database::models::{FavoriteInput, FileRecord, SearchResults, Stats, FILE_COLUMNS};
use crate::database::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::ingest::flatten::{Extracted, FieldKey, FieldMap, Flattener};
use crate::ingest::hasher;
use crate::media::mimetype;
use crate::query::{executor, QueryCompiler};
use crate::similarity::{self, HashEntry, SimilarMatch};
use crate::utils::config::Settings;

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Perceptual hashes of one file, algorithm name to hex string.
pub type PerceptualHashes = BTreeMap<String, String>;

/// Handle on an opened metadata store. Dropping it (or calling
/// [`MetaStore::close`]) releases every pooled connection.
pub struct MetaStore {
    pool: SqlitePool,
    settings: Settings,
    flattener: Flattener,
    compiler: QueryCompiler,
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MetaStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists. Safe to call repeatedly on the same file.
    pub fn open(path: &Path, settings: Settings) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::StorageDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let busy_timeout = Duration::from_millis(settings.pool.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |c| {
            c.pragma_update(None, "foreign_keys", "ON")?;
            c.pragma_update(None, "journal_mode", "WAL")?;
            c.busy_timeout(busy_timeout)?;
            functions::register(c)
        });

        let pool = Pool::builder()
            .max_size(settings.pool.max_size.max(1))
            .min_idle(Some(1))
            .build(manager)?;

        pool.get()?.execute_batch(SCHEMA)?;
        info!("Opened metadata store at {:?}", path);

        let flattener = Flattener::new(settings.flatten.clone());
        let compiler = QueryCompiler::new(settings.flatten.normalized_category.clone());
        Ok(Self {
            pool,
            settings,
            flattener,
            compiler,
        })
    }

    pub fn close(self) {
        if let Ok(conn) = self.pool.get() {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!("WAL checkpoint on close failed: {}", e);
            }
        }
        info!("Closed metadata store");
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn flattener(&self) -> &Flattener {
        &self.flattener
    }

    pub(crate) fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Runs a read and turns any failure into the empty value.
    pub(crate) fn read_or_default<T: Default>(&self, what: &str, read: impl FnOnce(&Connection) -> Result<T>) -> T {
        match self.conn().and_then(|conn| read(&conn)) {
            Ok(value) => value,
            Err(e) => {
                warn!("{} failed: {}", what, e);
                T::default()
            }
        }
    }

    /// Records the current metadata of the file at `path` and returns its id.
    ///
    /// The first extraction of a path is a baseline and writes no history.
    /// Later extractions diff the flattened document against the stored
    /// fields: if anything changed (or the content hash did), the fields are
    /// replaced and one history row is appended per changed field, all in a
    /// single transaction. Otherwise only `last_updated` moves.
    pub fn upsert(
        &self,
        path: &Path,
        document: &Value,
        hashes: Option<&PerceptualHashes>,
        favorite: Option<&FavoriteInput>,
    ) -> Result<i64> {
        // File I/O happens before the write lock is taken.
        let content_hash = hasher::calculate_hash(path)?;
        let metadata = fs::metadata(path).map_err(|e| Error::read(path, e))?;
        let size = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let file_type = mimetype::detect_mimetype(path)?;
        let extracted = self.flattener.extract(document);
        let path_key = path.to_string_lossy().to_string();

        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so two upserts of the same
        // path can never both read the old field set before either commits.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut now = now();

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, content_hash FROM files WHERE path = ?1",
                params![path_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let file_id = match existing {
            None => {
                let file_id: i64 = tx.query_row(
                    "INSERT INTO files (path, content_hash, size, mtime, file_type, first_seen, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     RETURNING id",
                    params![path_key, content_hash, size, mtime, file_type, now],
                    |row| row.get(0),
                )?;
                insert_fields(&tx, file_id, &extracted)?;
                debug!("Inserted {} with {} fields", path_key, extracted.fields.len());
                file_id
            }
            Some((file_id, old_hash)) => {
                // The ledger stays ordered even if the wall clock steps back.
                let latest: Option<String> = tx.query_row(
                    "SELECT MAX(changed_at) FROM version_history WHERE file_id = ?1",
                    params![file_id],
                    |row| row.get(0),
                )?;
                if let Some(latest) = latest {
                    if latest > now {
                        now = latest;
                    }
                }

                let current = load_fields_of_kind(&tx, file_id, false)?;
                let current_derived = load_fields_of_kind(&tx, file_id, true)?;
                let changes = diff_fields(&current, &extracted.fields);

                if old_hash != content_hash || !changes.is_empty() || current_derived != extracted.derived {
                    tx.execute("DELETE FROM metadata_fields WHERE file_id = ?1", params![file_id])?;
                    insert_fields(&tx, file_id, &extracted)?;
                    append_history(&tx, file_id, &now, &changes)?;
                    tx.execute(
                        "UPDATE files SET content_hash = ?1, size = ?2, mtime = ?3, file_type = ?4, last_updated = ?5
                         WHERE id = ?6",
                        params![content_hash, size, mtime, file_type, now, file_id],
                    )?;
                    debug!("Updated {}: {} field changes", path_key, changes.len());
                } else {
                    tx.execute(
                        "UPDATE files SET last_updated = ?1 WHERE id = ?2",
                        params![now, file_id],
                    )?;
                    debug!("Unchanged {}", path_key);
                }
                file_id
            }
        };

        if let Some(hashes) = hashes {
            store_hashes(&tx, file_id, hashes)?;
        }
        if let Some(favorite) = favorite {
            store_favorite(&tx, file_id, favorite, &now)?;
        }

        tx.commit()?;
        Ok(file_id)
    }

    /// Removes the file and, through the cascade, its fields, history,
    /// hashes and favorite. Returns whether anything was deleted.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM files WHERE path = ?1",
            params![path.to_string_lossy().to_string()],
        )?;
        if deleted > 0 {
            info!("Deleted {:?}", path);
        }
        Ok(deleted > 0)
    }

    pub fn get_file(&self, path: &Path) -> Option<FileRecord> {
        let path_key = path.to_string_lossy().to_string();
        self.read_or_default("get_file", |conn| {
            let sql = format!("SELECT {} FROM files f WHERE f.path = ?1", FILE_COLUMNS);
            Ok(conn.query_row(&sql, params![path_key], FileRecord::from_row).optional()?)
        })
    }

    pub fn get_file_by_id(&self, file_id: i64) -> Option<FileRecord> {
        self.read_or_default("get_file_by_id", |conn| {
            let sql = format!("SELECT {} FROM files f WHERE f.id = ?1", FILE_COLUMNS);
            Ok(conn.query_row(&sql, params![file_id], FileRecord::from_row).optional()?)
        })
    }

    /// Current flattened fields of a file. Empty if the file is unknown.
    pub fn fields(&self, file_id: i64) -> FieldMap {
        self.read_or_default("fields", |conn| load_fields(conn, file_id))
    }

    pub fn hashes(&self, file_id: i64) -> PerceptualHashes {
        self.read_or_default("hashes", |conn| {
            let mut stmt = conn.prepare("SELECT algorithm, hash FROM perceptual_hashes WHERE file_id = ?1")?;
            let rows = stmt.query_map(params![file_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<PerceptualHashes>>()?)
        })
    }

    /// Runs a query in the search language.
    ///
    /// Unparsable clauses are dropped; a query where nothing parses returns
    /// no files. `parsed_clauses`/`dropped_clauses` tell the two apart.
    pub fn search(&self, query: &str, limit: usize, offset: usize) -> SearchResults {
        let compiled = self.compiler.compile(query);
        let files = self.read_or_default("search", |conn| executor::execute(conn, &compiled, limit, offset));
        SearchResults {
            files,
            parsed_clauses: compiled.predicates.len(),
            dropped_clauses: compiled.dropped(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.read_or_default("stats", |conn| {
            let (total_files, total_size, distinct_content): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0), COUNT(DISTINCT content_hash) FROM files",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let total_favorites: i64 = conn.query_row("SELECT COUNT(*) FROM favorites", [], |row| row.get(0))?;

            let mut stmt = conn.prepare("SELECT file_type, COUNT(*) FROM files GROUP BY file_type")?;
            let by_type = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;

            Ok(Stats {
                total_files,
                total_favorites,
                total_size,
                by_type,
                distinct_content,
            })
        })
    }

    /// Files whose hash under the configured algorithm is within `threshold`
    /// bits of `query_hash`, nearest first.
    pub fn find_similar(&self, query_hash: &str, threshold: u32, limit: usize) -> Vec<SimilarMatch> {
        let algorithm = self.settings.similarity.algorithm.clone();
        self.find_similar_with(&algorithm, query_hash, threshold, limit)
    }

    pub fn find_similar_with(&self, algorithm: &str, query_hash: &str, threshold: u32, limit: usize) -> Vec<SimilarMatch> {
        let entries = self.read_or_default("find_similar", |conn| {
            let mut stmt = conn.prepare("SELECT file_id, hash FROM perceptual_hashes WHERE algorithm = ?1")?;
            let rows = stmt.query_map(params![algorithm], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            let mut entries = Vec::new();
            for row in rows {
                let (file_id, hex) = row?;
                match HashEntry::parse(file_id, hex) {
                    Some(entry) => entries.push(entry),
                    None => debug!("Skipping malformed {} hash of file {}", algorithm, file_id),
                }
            }
            Ok(entries)
        });

        let index = similarity::build_index(self.settings.similarity.index, entries);
        similarity::find_similar(index.as_ref(), query_hash, threshold, limit)
    }
}

fn collect_fields(stmt: &mut rusqlite::Statement<'_>, params: impl rusqlite::Params) -> Result<FieldMap> {
    let rows = stmt.query_map(params, |row| {
        Ok((FieldKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?), row.get(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<FieldMap>>()?)
}

/// Every stored field of a file, derived ones included.
pub(crate) fn load_fields(conn: &Connection, file_id: i64) -> Result<FieldMap> {
    let mut stmt = conn.prepare("SELECT category, field_key, value FROM metadata_fields WHERE file_id = ?1")?;
    collect_fields(&mut stmt, params![file_id])
}

fn load_fields_of_kind(conn: &Connection, file_id: i64, derived: bool) -> Result<FieldMap> {
    let mut stmt = conn.prepare(
        "SELECT category, field_key, value FROM metadata_fields WHERE file_id = ?1 AND derived = ?2",
    )?;
    collect_fields(&mut stmt, params![file_id, derived])
}

fn insert_fields(tx: &Transaction<'_>, file_id: i64, extracted: &Extracted) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO metadata_fields (file_id, category, field_key, value, derived) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (fields, derived) in [(&extracted.fields, false), (&extracted.derived, true)] {
        for (field, value) in fields {
            stmt.execute(params![file_id, field.category, field.key, value, derived])?;
        }
    }
    Ok(())
}

fn append_history(tx: &Transaction<'_>, file_id: i64, changed_at: &str, changes: &[FieldChange]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO version_history (file_id, changed_at, change_type, category, field_key, old_value, new_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for change in changes {
        stmt.execute(params![
            file_id,
            changed_at,
            change.change_type,
            change.field.category,
            change.field.key,
            change.old_value,
            change.new_value
        ])?;
    }
    Ok(())
}

fn store_hashes(tx: &Transaction<'_>, file_id: i64, hashes: &PerceptualHashes) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO perceptual_hashes (file_id, algorithm, hash) VALUES (?1, ?2, ?3)
         ON CONFLICT(file_id, algorithm) DO UPDATE SET hash = excluded.hash",
    )?;
    for (algorithm, hash) in hashes {
        stmt.execute(params![file_id, algorithm, hash])?;
    }
    Ok(())
}

fn store_favorite(tx: &Transaction<'_>, file_id: i64, favorite: &FavoriteInput, now: &str) -> Result<()> {
    let tags = serde_json::to_string(&favorite.tags)?;
    tx.execute(
        "INSERT INTO favorites (file_id, added_at, notes, tags) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(file_id) DO UPDATE SET notes = excluded.notes, tags = excluded.tags",
        params![file_id, now, favorite.notes, tags],
    )?;
    Ok(())
}

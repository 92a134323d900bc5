//! Read side of the version history ledger.
//!
//! The ledger holds deltas only. Rebuilding a document as it was at some
//! earlier time means replaying entries forward from the oldest one; there
//! are no snapshots.

use std::path::Path;
use rusqlite::params;

use crate::database::models::HistoryEntry;
use crate::database::store::MetaStore;

impl MetaStore {
    /// Field changes for a file, most recent first.
    pub fn history(&self, file_id: i64, limit: usize, offset: usize) -> Vec<HistoryEntry> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        self.read_or_default("history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_id, changed_at, change_type, category, field_key, old_value, new_value
                 FROM version_history
                 WHERE file_id = ?1
                 ORDER BY changed_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![file_id, limit, offset], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    changed_at: row.get(2)?,
                    change_type: row.get(3)?,
                    category: row.get(4)?,
                    key: row.get(5)?,
                    old_value: row.get(6)?,
                    new_value: row.get(7)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn history_for_path(&self, path: &Path, limit: usize, offset: usize) -> Vec<HistoryEntry> {
        match self.get_file(path) {
            Some(file) => self.history(file.id, limit, offset),
            None => Vec::new(),
        }
    }
}

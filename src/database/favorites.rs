use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::database::models::{FavoriteEntry, FileRecord};
use crate::database::store::{now, MetaStore};
use crate::error::Result;

impl MetaStore {
    /// Flips the favorite state of a file and returns the new state.
    ///
    /// The row existing *is* the favorite flag; un-favoriting deletes it along
    /// with its notes and tags. Unknown files stay un-favorited.
    pub fn toggle_favorite(&self, file_id: i64, notes: Option<&str>, tags: Option<&[String]>) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let file_exists = tx
            .query_row("SELECT 1 FROM files WHERE id = ?1", params![file_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !file_exists {
            warn!("Cannot favorite unknown file {}", file_id);
            return Ok(false);
        }

        let removed = tx.execute("DELETE FROM favorites WHERE file_id = ?1", params![file_id])?;
        let favorited = if removed > 0 {
            false
        } else {
            let tags = serde_json::to_string(tags.unwrap_or_default())?;
            tx.execute(
                "INSERT INTO favorites (file_id, added_at, notes, tags) VALUES (?1, ?2, ?3, ?4)",
                params![file_id, now(), notes, tags],
            )?;
            true
        };

        tx.commit()?;
        debug!("File {} favorite = {}", file_id, favorited);
        Ok(favorited)
    }

    pub fn is_favorite(&self, file_id: i64) -> bool {
        self.read_or_default("is_favorite", |conn| {
            Ok(conn
                .query_row("SELECT 1 FROM favorites WHERE file_id = ?1", params![file_id], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    /// Favorited files, most recently favorited first.
    pub fn list_favorites(&self, limit: usize) -> Vec<FavoriteEntry> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.read_or_default("list_favorites", |conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.path, f.content_hash, f.size, f.mtime, f.file_type, f.first_seen, f.last_updated,
                        fav.added_at, fav.notes, fav.tags
                 FROM favorites fav
                 JOIN files f ON f.id = fav.file_id
                 ORDER BY fav.added_at DESC, fav.file_id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let tags: String = row.get(10)?;
                Ok(FavoriteEntry {
                    file: FileRecord::from_row(row)?,
                    added_at: row.get(8)?,
                    notes: row.get(9)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

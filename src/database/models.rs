use std::collections::BTreeMap;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Column list matching [`FileRecord::from_row`], for a `files` table aliased `f`.
pub const FILE_COLUMNS: &str =
    "f.id, f.path, f.content_hash, f.size, f.mtime, f.file_type, f.first_seen, f.last_updated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub content_hash: String,
    pub size: i64,
    /// Unix seconds.
    pub mtime: i64,
    pub file_type: String,
    pub first_seen: String,
    pub last_updated: String,
}

impl FileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            content_hash: row.get(2)?,
            size: row.get(3)?,
            mtime: row.get(4)?,
            file_type: row.get(5)?,
            first_seen: row.get(6)?,
            last_updated: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Updated,
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Updated => "updated",
            ChangeType::Removed => "removed",
        }
    }
}

impl ToSql for ChangeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "added" => Ok(ChangeType::Added),
            "updated" => Ok(ChangeType::Updated),
            "removed" => Ok(ChangeType::Removed),
            other => Err(FromSqlError::Other(format!("unknown change type '{}'", other).into())),
        }
    }
}

/// One field-level change. `old_value` is `None` for additions, `new_value`
/// is `None` for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub file_id: i64,
    pub changed_at: String,
    pub change_type: ChangeType,
    pub category: String,
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteInput {
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub file: FileRecord,
    pub added_at: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_files: i64,
    pub total_favorites: i64,
    pub total_size: i64,
    pub by_type: BTreeMap<String, i64>,
    pub distinct_content: i64,
}

/// Search hits plus how many clauses of the query were understood.
///
/// An empty `files` with `parsed_clauses == 0` means the query did not parse
/// at all; the result is still empty rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub files: Vec<FileRecord>,
    pub parsed_clauses: usize,
    pub dropped_clauses: usize,
}

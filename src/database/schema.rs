pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT UNIQUE NOT NULL,
        content_hash TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        file_type TEXT NOT NULL,
        first_seen TEXT NOT NULL,
        last_updated TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS metadata_fields (
        file_id INTEGER NOT NULL,
        category TEXT NOT NULL,
        field_key TEXT NOT NULL,
        value TEXT NOT NULL,
        -- 1 for normalized values derived at upsert time. These stay out of history.
        derived INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY(file_id, category, field_key),
        FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS version_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL,
        changed_at TEXT NOT NULL,
        change_type TEXT NOT NULL CHECK (change_type IN ('added', 'updated', 'removed')),
        category TEXT NOT NULL,
        field_key TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    -- History rows are never rewritten. Removal only happens through the file cascade.
    CREATE TRIGGER IF NOT EXISTS version_history_append_only
    BEFORE UPDATE ON version_history
    BEGIN
        SELECT RAISE(ABORT, 'version_history is append-only');
    END;

    CREATE TABLE IF NOT EXISTS perceptual_hashes (
        file_id INTEGER NOT NULL,
        algorithm TEXT NOT NULL,
        hash TEXT NOT NULL,
        PRIMARY KEY(file_id, algorithm),
        FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS favorites (
        file_id INTEGER PRIMARY KEY,
        added_at TEXT NOT NULL,
        notes TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_files_last_updated ON files(last_updated);
    CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
    CREATE INDEX IF NOT EXISTS idx_fields_category_key ON metadata_fields(category, field_key);
    CREATE INDEX IF NOT EXISTS idx_history_file ON version_history(file_id, id);
    CREATE INDEX IF NOT EXISTS idx_hashes_algorithm ON perceptual_hashes(algorithm);
    CREATE INDEX IF NOT EXISTS idx_favorites_added_at ON favorites(added_at);
";

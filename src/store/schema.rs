use rusqlite::Connection;

use crate::error::Result;

/// Initialize the document store schema.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per document; body is the JSON object
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Enable WAL mode for concurrent reads
        PRAGMA journal_mode=WAL;
        ",
    )?;

    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

pub fn apply_ledger_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS photos (
  file TEXT PRIMARY KEY,
  date TEXT,
  position INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS photo_faces (
  photo TEXT NOT NULL,
  ord INTEGER NOT NULL,
  face_id TEXT NOT NULL,
  PRIMARY KEY(photo, ord)
);

CREATE TABLE IF NOT EXISTS faces (
  face_id TEXT PRIMARY KEY,
  photo TEXT NOT NULL,
  bbox_top INTEGER NOT NULL,
  bbox_right INTEGER NOT NULL,
  bbox_bottom INTEGER NOT NULL,
  bbox_left INTEGER NOT NULL,
  thumbnail TEXT NOT NULL,
  group_label INTEGER NOT NULL DEFAULT -1,
  name TEXT,
  name_source TEXT,
  date TEXT,
  position INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_faces_group ON faces(group_label);
CREATE INDEX IF NOT EXISTS idx_faces_photo ON faces(photo);
    "#,
    )?;

    // Ledgers written before names carried provenance lack the column.
    let mut stmt = conn.prepare("PRAGMA table_info(faces)")?;
    let mut has_name_source = false;
    {
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in rows {
            if name.unwrap_or_default() == "name_source" {
                has_name_source = true;
                break;
            }
        }
    }
    if !has_name_source {
        let _ = conn.execute("ALTER TABLE faces ADD COLUMN name_source TEXT", []);
    }

    Ok(())
}

pub fn apply_identity_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS identities (
  group_key TEXT PRIMARY KEY,
  name TEXT NOT NULL
);
    "#,
    )?;
    Ok(())
}

pub fn apply_embedding_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS embeddings (
  face_id TEXT PRIMARY KEY,
  position INTEGER NOT NULL,
  dim INTEGER NOT NULL,
  vector BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS failed (
  face_id TEXT PRIMARY KEY
);
    "#,
    )?;
    Ok(())
}

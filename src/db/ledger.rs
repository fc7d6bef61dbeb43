use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;

use super::{schema, Store};
use crate::ledger::Ledger;
use crate::models::{BoundingBox, FaceRecord, NameSource, PhotoRecord};

/// Faces and photos, persisted in `ledger.db`.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = super::open_or_reset(db_path, schema::apply_ledger_schema)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_ledger_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn row_to_face(row: &Row<'_>) -> rusqlite::Result<FaceRecord> {
    let source: Option<String> = row.get(8)?;
    Ok(FaceRecord {
        face_id: row.get(0)?,
        photo: row.get(1)?,
        bbox: BoundingBox {
            top: row.get(2)?,
            right: row.get(3)?,
            bottom: row.get(4)?,
            left: row.get(5)?,
        },
        thumbnail: row.get(6)?,
        group: row.get(7)?,
        name_source: source.as_deref().and_then(NameSource::parse),
        name: row.get(9)?,
        date: row.get(10)?,
    })
}

impl Store for LedgerStore {
    type State = Ledger;

    fn load(&self) -> Result<Ledger> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT face_id, photo, bbox_top, bbox_right, bbox_bottom, bbox_left, thumbnail, group_label, name_source, name, date
             FROM faces ORDER BY position",
        )?;
        let faces = stmt
            .query_map([], row_to_face)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut links: HashMap<String, Vec<String>> = HashMap::new();
        let mut stmt = conn.prepare("SELECT photo, face_id FROM photo_faces ORDER BY photo, ord")?;
        let rows =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (photo, face_id) = row?;
            links.entry(photo).or_default().push(face_id);
        }

        let mut stmt = conn.prepare("SELECT file, date FROM photos ORDER BY position")?;
        let photos = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
            .map(|r| {
                r.map(|(file, date)| {
                    let faces = links.remove(&file).unwrap_or_default();
                    PhotoRecord { file, date, faces }
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Ledger { faces, photos })
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM faces", [])?;
        tx.execute("DELETE FROM photo_faces", [])?;
        tx.execute("DELETE FROM photos", [])?;
        {
            let mut insert_face = tx.prepare(
                "INSERT INTO faces (face_id, photo, bbox_top, bbox_right, bbox_bottom, bbox_left, thumbnail, group_label, name, name_source, date, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for (pos, f) in ledger.faces.iter().enumerate() {
                insert_face.execute(params![
                    f.face_id,
                    f.photo,
                    f.bbox.top,
                    f.bbox.right,
                    f.bbox.bottom,
                    f.bbox.left,
                    f.thumbnail,
                    f.group,
                    f.name,
                    f.name_source.map(|s| s.as_str()),
                    f.date,
                    pos as i64,
                ])?;
            }

            let mut insert_photo =
                tx.prepare("INSERT INTO photos (file, date, position) VALUES (?1, ?2, ?3)")?;
            let mut insert_link =
                tx.prepare("INSERT INTO photo_faces (photo, ord, face_id) VALUES (?1, ?2, ?3)")?;
            for (pos, p) in ledger.photos.iter().enumerate() {
                insert_photo.execute(params![p.file, p.date, pos as i64])?;
                for (ord, face_id) in p.faces.iter().enumerate() {
                    insert_link.execute(params![p.file, ord as i64, face_id])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use super::{decode_vector, encode_vector, schema, Store};

/// Face embeddings in matched order: `ids[i]` owns `vectors[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    pub ids: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
    /// Faces whose assets yielded no usable vector. They are not retried
    /// until the set is recomputed.
    pub failed: BTreeSet<String>,
}

impl EmbeddingSet {
    pub fn from_parts(vectors: Vec<Vec<f32>>, ids: Vec<String>) -> Self {
        debug_assert_eq!(vectors.len(), ids.len());
        Self { ids, vectors, failed: BTreeSet::new() }
    }

    pub fn into_parts(self) -> (Vec<Vec<f32>>, Vec<String>) {
        (self.vectors, self.ids)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, face_id: &str) -> bool {
        self.ids.iter().any(|id| id == face_id)
    }

    pub fn get(&self, face_id: &str) -> Option<&[f32]> {
        self.ids.iter().position(|id| id == face_id).map(|i| self.vectors[i].as_slice())
    }

    /// Dimension of the stored vectors, if any are stored.
    pub fn dim(&self) -> Option<usize> {
        self.vectors.first().map(|v| v.len())
    }

    /// Appends `vector` unless `face_id` already has an entry. Existing
    /// entries are never overwritten.
    pub fn insert(&mut self, face_id: String, vector: Vec<f32>) -> bool {
        if self.contains(&face_id) {
            return false;
        }
        self.ids.push(face_id);
        self.vectors.push(vector);
        true
    }

    pub fn mark_failed(&mut self, face_id: &str) -> bool {
        self.failed.insert(face_id.to_string())
    }

    pub fn is_failed(&self, face_id: &str) -> bool {
        self.failed.contains(face_id)
    }

    /// Drops entries whose face is not in `keep`, failure marks included.
    /// Returns how many embeddings were dropped.
    pub fn retain_ids(&mut self, keep: &HashSet<&str>) -> usize {
        self.failed.retain(|id| keep.contains(id.as_str()));
        let before = self.ids.len();
        let (ids, vectors): (Vec<_>, Vec<_>) = std::mem::take(&mut self.ids)
            .into_iter()
            .zip(std::mem::take(&mut self.vectors))
            .filter(|(id, _)| keep.contains(id.as_str()))
            .unzip();
        self.ids = ids;
        self.vectors = vectors;
        before - self.ids.len()
    }
}

/// Identifier-keyed vectors, persisted in `embeddings.db`.
pub struct EmbeddingStore {
    conn: Mutex<Connection>,
}

impl EmbeddingStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = super::open_or_reset(db_path, schema::apply_embedding_schema)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_embedding_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl Store for EmbeddingStore {
    type State = EmbeddingSet;

    fn load(&self) -> Result<EmbeddingSet> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT face_id, dim, vector FROM embeddings ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, Vec<u8>>(2)?))
        })?;
        let mut set = EmbeddingSet::default();
        for row in rows {
            let (face_id, dim, blob) = row?;
            match decode_vector(&blob) {
                Ok(v) if v.len() as i64 == dim => {
                    set.ids.push(face_id);
                    set.vectors.push(v);
                }
                Ok(v) => tracing::warn!(
                    "Embedding for {} has {} values, expected {}; skipping",
                    face_id,
                    v.len(),
                    dim
                ),
                Err(e) => tracing::warn!("Failed to decode embedding for {}: {}", face_id, e),
            }
        }

        let mut stmt = conn.prepare("SELECT face_id FROM failed")?;
        let failed = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for face_id in failed {
            set.failed.insert(face_id?);
        }
        Ok(set)
    }

    fn save(&self, set: &EmbeddingSet) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM embeddings", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings (face_id, position, dim, vector) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (pos, (id, v)) in set.ids.iter().zip(set.vectors.iter()).enumerate() {
                stmt.execute(params![id, pos as i64, v.len() as i64, encode_vector(v)])?;
            }
            tx.execute("DELETE FROM failed", [])?;
            let mut stmt = tx.prepare("INSERT INTO failed (face_id) VALUES (?1)")?;
            for id in &set.failed {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

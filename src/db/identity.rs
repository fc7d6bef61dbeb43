use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use super::{schema, Store};
use crate::ledger::IdentityMap;

/// Group-key to name mapping, persisted in `identities.db`.
pub struct IdentityStore {
    conn: Mutex<Connection>,
}

impl IdentityStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = super::open_or_reset(db_path, schema::apply_identity_schema)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_identity_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl Store for IdentityStore {
    type State = IdentityMap;

    fn load(&self) -> Result<IdentityMap> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT group_key, name FROM identities")?;
        let rows =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut map = IdentityMap::default();
        for row in rows {
            let (key, name) = row?;
            map.insert(key, name);
        }
        Ok(map)
    }

    fn save(&self, map: &IdentityMap) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM identities", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO identities (group_key, name) VALUES (?1, ?2)")?;
            for (key, name) in map.iter() {
                stmt.execute(params![key, name])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

pub mod schema;
pub mod ledger;
pub mod identity;
pub mod embeddings;

pub use embeddings::{EmbeddingSet, EmbeddingStore};
pub use identity::IdentityStore;
pub use ledger::LedgerStore;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::ledger::{IdentityMap, Ledger};

pub const LEDGER_DB: &str = "ledger.db";
pub const IDENTITIES_DB: &str = "identities.db";
pub const EMBEDDINGS_DB: &str = "embeddings.db";

/// A durable collection persisted as one unit.
///
/// `save` replaces everything previously stored. Every public operation is
/// expected to go through [`Store::update`]: load the full state, mutate it in
/// memory, persist it again. Two processes doing this against the same file
/// race and the last writer wins.
pub trait Store {
    type State: Default;

    fn load(&self) -> Result<Self::State>;
    fn save(&self, state: &Self::State) -> Result<()>;

    /// Load, mutate, save. Nothing is written when `f` fails.
    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&mut Self::State) -> std::result::Result<T, E>,
    {
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}

/// Load both, mutate, then save `first` before `second`. Nothing is written
/// when `f` fails; when the second save fails the first one has landed.
pub fn update_pair<A, B, T, E, F>(first: &A, second: &B, f: F) -> std::result::Result<T, E>
where
    A: Store,
    B: Store,
    E: From<anyhow::Error>,
    F: FnOnce(&mut A::State, &mut B::State) -> std::result::Result<T, E>,
{
    let mut a = first.load()?;
    let mut b = second.load()?;
    let out = f(&mut a, &mut b)?;
    first.save(&a)?;
    second.save(&b)?;
    Ok(out)
}

pub fn open_or_create<P: AsRef<Path>>(
    db_path: P,
    apply_schema: fn(&Connection) -> Result<()>,
) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    schema::apply_pragmas(&conn)?;
    apply_schema(&conn)?;
    // Forces a read of the header so a corrupt file fails here rather than on first use.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))?;
    Ok(conn)
}

/// Like [`open_or_create`], but an unreadable file is moved aside and replaced
/// by an empty store instead of aborting startup.
pub fn open_or_reset<P: AsRef<Path>>(
    db_path: P,
    apply_schema: fn(&Connection) -> Result<()>,
) -> Result<Connection> {
    let db_path = db_path.as_ref();
    match open_or_create(db_path, apply_schema) {
        Ok(conn) => Ok(conn),
        Err(e) if db_path.exists() => {
            let aside = corrupt_path(db_path);
            error!(
                "Store {} is unreadable ({:#}); moving it to {} and starting empty",
                db_path.display(),
                e,
                aside.display()
            );
            std::fs::rename(db_path, &aside)
                .with_context(|| format!("failed to move corrupt store {}", db_path.display()))?;
            for suffix in ["-wal", "-shm"] {
                let side = PathBuf::from(format!("{}{}", db_path.display(), suffix));
                let _ = std::fs::remove_file(side);
            }
            open_or_create(db_path, apply_schema)
        }
        Err(e) => Err(e),
    }
}

fn corrupt_path(db_path: &Path) -> PathBuf {
    let ts = chrono::Utc::now().timestamp();
    let name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    db_path.with_file_name(format!("{name}.corrupt-{ts}"))
}

/// The three independent stores making up the persisted state.
pub struct Stores {
    pub ledger: LedgerStore,
    pub identities: IdentityStore,
    pub embeddings: EmbeddingStore,
}

impl Stores {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self {
            ledger: LedgerStore::open(dir.join(LEDGER_DB))?,
            identities: IdentityStore::open(dir.join(IDENTITIES_DB))?,
            embeddings: EmbeddingStore::open(dir.join(EMBEDDINGS_DB))?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            ledger: LedgerStore::open_in_memory()?,
            identities: IdentityStore::open_in_memory()?,
            embeddings: EmbeddingStore::open_in_memory()?,
        })
    }

    /// One cycle over the Identity Map and the ledger. The map is saved first,
    /// so a failed ledger save leaves the map ahead of the ledger, never behind;
    /// the next propagation or grouping run brings the ledger back in line.
    pub fn update_names_and_ledger<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&mut IdentityMap, &mut Ledger) -> std::result::Result<T, E>,
    {
        update_pair(&self.identities, &self.ledger, f)
    }
}

pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub(crate) fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        anyhow::bail!("vector blob length {} is not a multiple of 4", blob.len());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct Recording<'a> {
        name: &'static str,
        log: &'a RefCell<Vec<&'static str>>,
        fail_save: bool,
    }

    impl Store for Recording<'_> {
        type State = Vec<i64>;

        fn load(&self) -> Result<Vec<i64>> {
            Ok(Vec::new())
        }

        fn save(&self, _state: &Vec<i64>) -> Result<()> {
            if self.fail_save {
                anyhow::bail!("{} is read-only", self.name);
            }
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    #[test]
    fn pair_update_saves_first_store_first() {
        let log = RefCell::new(Vec::new());
        let names = Recording { name: "names", log: &log, fail_save: false };
        let ledger = Recording { name: "ledger", log: &log, fail_save: false };
        let out: Result<i64> = update_pair(&names, &ledger, |a, b| {
            a.push(1);
            b.push(2);
            Ok(3)
        });
        assert_eq!(out.unwrap(), 3);
        assert_eq!(*log.borrow(), vec!["names", "ledger"]);
    }

    #[test]
    fn pair_update_writes_nothing_when_mutation_fails() {
        let log = RefCell::new(Vec::new());
        let names = Recording { name: "names", log: &log, fail_save: false };
        let ledger = Recording { name: "ledger", log: &log, fail_save: false };
        let out: Result<()> = update_pair(&names, &ledger, |_, _| anyhow::bail!("rejected"));
        assert!(out.is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn failed_second_save_leaves_first_in_place() {
        let log = RefCell::new(Vec::new());
        let names = Recording { name: "names", log: &log, fail_save: false };
        let ledger = Recording { name: "ledger", log: &log, fail_save: true };
        let out: Result<()> = update_pair(&names, &ledger, |_, _| Ok(()));
        assert!(out.is_err());
        assert_eq!(*log.borrow(), vec!["names"]);
    }

    #[test]
    fn vector_blob_decodes_to_same_values() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
        assert!(decode_vector(&[1, 2, 3]).is_err());
    }

    #[test]
    fn corrupt_store_is_moved_aside() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LEDGER_DB);
        std::fs::write(&path, vec![b'x'; 2048]).unwrap();

        let conn = open_or_reset(&path, schema::apply_ledger_schema).unwrap();
        let faces: i64 = conn.query_row("SELECT COUNT(*) FROM faces", [], |r| r.get(0)).unwrap();
        assert_eq!(faces, 0);

        let moved = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("ledger.db.corrupt-"));
        assert!(moved);
    }

    #[test]
    fn stores_open_independently() {
        let tmp = TempDir::new().unwrap();
        // Only one of the three files exists beforehand.
        drop(IdentityStore::open(tmp.path().join(IDENTITIES_DB)).unwrap());
        let stores = Stores::open(tmp.path()).unwrap();
        assert!(stores.ledger.load().unwrap().faces.is_empty());
        assert!(stores.embeddings.load().unwrap().is_empty());
        assert!(stores.identities.load().unwrap().is_empty());
    }
}

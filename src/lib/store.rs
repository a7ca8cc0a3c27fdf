use std::{collections::BTreeMap, path::PathBuf, time::Instant};

use metrics::{counter, histogram};
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};

use crate::{
    entity::{Entity, EntityKind},
    error::{IndexError, Result},
    event::EventPosition,
};

const SEP: u8 = 0x1F;
const CURSOR_KEY: &str = "cursor";

/// Byte-level key/value storage underneath the [`EntityStore`].
pub trait StoreBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies every entry or none of them.
    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;
}

pub struct RocksBackend {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksBackend {
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&options, &path).map_err(|err| {
            IndexError::Storage(format!("failed to open store at {}: {err}", path.display()))
        })?;
        Ok(Self { db })
    }

    fn collect_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }
}

impl StoreBackend for RocksBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let result = self.db.get(key).map_err(IndexError::from);
        record_store_op("rocksdb_get", status_label(&result), start);
        result
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = Instant::now();
        let result = self.collect_prefix(prefix);
        record_store_op("rocksdb_scan", status_label(&result), start);
        result
    }

    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let start = Instant::now();
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put(key, value);
        }
        let result = self.db.write(batch).map_err(IndexError::from);
        record_store_op("rocksdb_write_batch", status_label(&result), start);
        result
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl StoreBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.lock();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.extend(batch);
        Ok(())
    }
}

/// Typed entity access over a [`StoreBackend`]. Writes only happen through a
/// [`Transaction`], of which at most one exists at a time.
pub struct EntityStore {
    backend: Box<dyn StoreBackend>,
    write_lock: Mutex<()>,
}

pub struct Transaction<'a> {
    store: &'a EntityStore,
    _guard: MutexGuard<'a, ()>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
    cursor: Option<EventPosition>,
}

impl EntityStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self::with_backend(Box::new(RocksBackend::open(path)?)))
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::default()))
    }

    pub fn with_backend(backend: Box<dyn StoreBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn load<E: Entity>(&self, kind: EntityKind, id: &str) -> Result<Option<E>> {
        self.backend
            .get(&entity_key(kind, id))?
            .map(|bytes| decode_entity(kind, &bytes))
            .transpose()
    }

    pub fn list<E: Entity>(&self, kind: EntityKind) -> Result<Vec<E>> {
        self.backend
            .scan_prefix(&kind_prefix(kind))?
            .into_iter()
            .map(|(_, bytes)| decode_entity(kind, &bytes))
            .collect()
    }

    /// Position of the last event whose effects have been committed.
    pub fn cursor(&self) -> Result<Option<EventPosition>> {
        self.backend
            .get(CURSOR_KEY.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(IndexError::from))
            .transpose()
    }

    pub fn transaction(&self) -> Result<Transaction<'_>> {
        let guard = self.write_lock.lock();
        Ok(Transaction {
            store: self,
            _guard: guard,
            pending: BTreeMap::new(),
            cursor: None,
        })
    }
}

impl<'a> Transaction<'a> {
    /// Reads through pending writes first so a transaction sees its own upserts.
    pub fn load<E: Entity>(&self, kind: EntityKind, id: &str) -> Result<Option<E>> {
        let key = entity_key(kind, id);
        match self.pending.get(&key) {
            Some(bytes) => decode_entity(kind, bytes).map(Some),
            None => self.store.load(kind, id),
        }
    }

    pub fn upsert<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let key = entity_key(entity.kind(), entity.id());
        let value = serde_json::to_vec(entity)?;
        self.pending.insert(key, value);
        Ok(())
    }

    pub fn cursor(&self) -> Result<Option<EventPosition>> {
        match self.cursor {
            Some(cursor) => Ok(Some(cursor)),
            None => self.store.cursor(),
        }
    }

    pub fn set_cursor(&mut self, position: EventPosition) {
        self.cursor = Some(position);
    }

    /// Writes every pending entity and the cursor as one batch. Returns the
    /// number of entities written.
    pub fn commit(mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        let written = pending.len();
        if written == 0 && self.cursor.is_none() {
            return Ok(0);
        }

        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = pending.into_iter().collect();
        if let Some(cursor) = self.cursor {
            entries.push((CURSOR_KEY.as_bytes().to_vec(), serde_json::to_vec(&cursor)?));
        }
        self.store.backend.write_batch(entries)?;
        Ok(written)
    }
}

fn decode_entity<E: Entity>(kind: EntityKind, bytes: &[u8]) -> Result<E> {
    serde_json::from_slice(bytes)
        .map_err(|err| IndexError::Storage(format!("failed to deserialize {kind} entity: {err}")))
}

fn kind_prefix(kind: EntityKind) -> Vec<u8> {
    let mut key = kind.prefix().as_bytes().to_vec();
    key.push(SEP);
    key
}

fn entity_key(kind: EntityKind, id: &str) -> Vec<u8> {
    let mut key = kind_prefix(kind);
    key.extend_from_slice(id.as_bytes());
    key
}

fn status_label<T>(result: &Result<T>) -> &'static str {
    if result.is_ok() { "ok" } else { "err" }
}

fn record_store_op(operation: &'static str, status: &'static str, start: Instant) {
    counter!(
        "salegraph_store_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    histogram!(
        "salegraph_store_operation_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

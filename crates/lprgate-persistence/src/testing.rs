//! In-memory store fakes for unit tests
//!
//! `MemoryDurableStore` follows PostgreSQL where it matters to migration: an
//! explicit id does not advance the sequence, a store-assigned id that lands
//! on an occupied id is a unique violation, setval is not transactional, and
//! nothing staged in an import is visible before commit.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lprgate_core::{
    ConnectionTarget, DurableConnector, DurableStore, DurableTarget, Error, ImportTransaction,
    LocalStore, NewRecord, Record, RecordFilter, RecordId, RecordStore, Result, StoreMode,
};

fn matches_filter(record: &Record, filter: &RecordFilter) -> bool {
    let plate_ok = filter.plate.as_ref().is_none_or(|p| {
        record
            .plate
            .replace(['-', ' '], "")
            .to_uppercase()
            .contains(p.as_str())
    });
    let start_ok = filter.start.is_none_or(|s| record.timestamp >= s);
    let end_ok = filter.end.is_none_or(|e| record.timestamp < e);
    plate_ok && start_ok && end_ok
}

fn newest_first(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    records
}

#[derive(Default)]
struct LocalState {
    rows: BTreeMap<RecordId, Record>,
    next_id: RecordId,
    insert_after_load: Option<NewRecord>,
}

/// Fake embedded store
pub struct MemoryLocalStore {
    state: Mutex<LocalState>,
    fail_discard: AtomicBool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalState {
                next_id: 1,
                ..LocalState::default()
            }),
            fail_discard: AtomicBool::new(false),
        }
    }

    pub fn set_next_id(&self, id: RecordId) {
        self.state.lock().unwrap().next_id = id;
    }

    /// Simulate a request inserting right after the migration snapshot
    pub fn insert_after_next_load(&self, record: NewRecord) {
        self.state.lock().unwrap().insert_after_load = Some(record);
    }

    pub fn set_fail_discard(&self, fail: bool) {
        self.fail_discard.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    fn insert_locked(state: &mut LocalState, record: &NewRecord) -> Record {
        let id = state.next_id;
        state.next_id += 1;
        let stored = record.clone().into_record(id);
        state.rows.insert(id, stored.clone());
        stored
    }
}

#[async_trait]
impl RecordStore for MemoryLocalStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    fn location(&self) -> String {
        "memory://local".to_string()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, record: &NewRecord) -> Result<Record> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::insert_locked(&mut state, record))
    }

    async fn attach_image(&self, id: RecordId, image_path: &str) -> Result<()> {
        if let Some(row) = self.state.lock().unwrap().rows.get_mut(&id) {
            row.image_path = Some(image_path.to_string());
        }
        Ok(())
    }

    async fn find_recent(&self, plate: &str, since: NaiveDateTime) -> Result<Option<Record>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .values()
            .filter(|r| r.plate == plate && r.timestamp >= since)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let state = self.state.lock().unwrap();
        Ok(newest_first(
            state
                .rows
                .values()
                .filter(|r| matches_filter(r, filter))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn load_buffered(&self) -> Result<Vec<Record>> {
        let mut state = self.state.lock().unwrap();
        let snapshot: Vec<Record> = state.rows.values().cloned().collect();
        if let Some(late) = state.insert_after_load.take() {
            Self::insert_locked(&mut state, &late);
        }
        Ok(snapshot)
    }

    async fn discard(&self, ids: &[RecordId]) -> Result<u64> {
        if self.fail_discard.load(Ordering::SeqCst) {
            return Err(Error::Database("disk I/O error".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        Ok(ids.iter().filter(|id| state.rows.remove(*id).is_some()).count() as u64)
    }
}

struct DurableState {
    rows: BTreeMap<RecordId, Record>,
    sequence_next: RecordId,
}

impl DurableState {
    fn nextval(&mut self) -> RecordId {
        let id = self.sequence_next;
        self.sequence_next += 1;
        id
    }
}

/// Fake durable store with switchable reachability and failure injection
pub struct MemoryDurableStore {
    state: Arc<Mutex<DurableState>>,
    reachable: AtomicBool,
    hanging: AtomicBool,
    panic_on_ping: AtomicBool,
    fail_import_after: Mutex<Option<usize>>,
    imports_started: AtomicUsize,
    schema_calls: AtomicUsize,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DurableState {
                rows: BTreeMap::new(),
                sequence_next: 1,
            })),
            reachable: AtomicBool::new(true),
            hanging: AtomicBool::new(false),
            panic_on_ping: AtomicBool::new(false),
            fail_import_after: Mutex::new(None),
            imports_started: AtomicUsize::new(0),
            schema_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn set_panic_on_ping(&self, panic: bool) {
        self.panic_on_ping.store(panic, Ordering::SeqCst);
    }

    /// Make the next imports fail once `inserts` rows have been staged
    pub fn fail_import_after(&self, inserts: usize) {
        *self.fail_import_after.lock().unwrap() = Some(inserts);
    }

    pub fn clear_import_failure(&self) {
        *self.fail_import_after.lock().unwrap() = None;
    }

    pub fn imports_started(&self) -> usize {
        self.imports_started.load(Ordering::SeqCst)
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    /// Insert a row with an explicit id, leaving the sequence alone
    pub fn seed_with_id(&self, id: RecordId, plate: &str) -> Record {
        let record = NewRecord::new(plate).into_record(id);
        self.state.lock().unwrap().rows.insert(id, record.clone());
        record
    }

    pub fn rows(&self) -> BTreeMap<RecordId, Record> {
        self.state.lock().unwrap().rows.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryDurableStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Durable
    }

    fn location(&self) -> String {
        "memory://durable".to_string()
    }

    async fn ping(&self) -> Result<()> {
        if self.panic_on_ping.load(Ordering::SeqCst) {
            panic!("driver bug");
        }
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Database(
                "PostgreSQL ping failed: error connecting: Connection refused (os error 111)"
                    .to_string(),
            ))
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, record: &NewRecord) -> Result<Record> {
        let mut state = self.state.lock().unwrap();
        let id = state.nextval();
        if state.rows.contains_key(&id) {
            return Err(Error::Database(format!("duplicate key value (id)=({})", id)));
        }
        let stored = record.clone().into_record(id);
        state.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn attach_image(&self, id: RecordId, image_path: &str) -> Result<()> {
        if let Some(row) = self.state.lock().unwrap().rows.get_mut(&id) {
            row.image_path = Some(image_path.to_string());
        }
        Ok(())
    }

    async fn find_recent(&self, plate: &str, since: NaiveDateTime) -> Result<Option<Record>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .values()
            .filter(|r| r.plate == plate && r.timestamp >= since)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let state = self.state.lock().unwrap();
        Ok(newest_first(
            state
                .rows
                .values()
                .filter(|r| matches_filter(r, filter))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl DurableTarget for MemoryDurableStore {
    async fn begin_import(&self) -> Result<Box<dyn ImportTransaction>> {
        self.ping().await?;
        self.imports_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryImport {
            state: Arc::clone(&self.state),
            staged: BTreeMap::new(),
            fail_after: *self.fail_import_after.lock().unwrap(),
        }))
    }
}

struct MemoryImport {
    state: Arc<Mutex<DurableState>>,
    staged: BTreeMap<RecordId, Record>,
    fail_after: Option<usize>,
}

#[async_trait]
impl ImportTransaction for MemoryImport {
    async fn occupied_ids(&mut self) -> Result<HashSet<RecordId>> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.keys().chain(self.staged.keys()).copied().collect())
    }

    async fn existing_keys(&mut self, keys: &[String]) -> Result<HashSet<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .values()
            .chain(self.staged.values())
            .filter_map(|r| r.ingest_key.clone())
            .filter(|k| keys.contains(k))
            .collect())
    }

    async fn insert(&mut self, record: &NewRecord, id: Option<RecordId>) -> Result<RecordId> {
        if self.fail_after == Some(self.staged.len()) {
            return Err(Error::Database("server closed the connection unexpectedly".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let id = match id {
            Some(id) => id,
            None => state.nextval(),
        };
        if state.rows.contains_key(&id) || self.staged.contains_key(&id) {
            return Err(Error::Database(format!("duplicate key value (id)=({})", id)));
        }
        self.staged.insert(id, record.clone().into_record(id));
        Ok(id)
    }

    async fn reconcile_sequence(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let max = state
            .rows
            .keys()
            .chain(self.staged.keys())
            .max()
            .copied()
            .unwrap_or(0);
        state.sequence_next = max + 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut state = this.state.lock().unwrap();
        state.rows.extend(this.staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Hands out one shared fake durable store
pub struct MemoryConnector {
    store: Arc<MemoryDurableStore>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryDurableStore>) -> Self {
        Self {
            store,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl DurableConnector for MemoryConnector {
    fn connect(&self, _target: &ConnectionTarget) -> Result<Arc<dyn DurableStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}

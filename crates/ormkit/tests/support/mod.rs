//! In-memory storage driver shared by the integration suites.
//!
//! Committed rows live in a plain map; an open transaction stages batches
//! in an overlay, and savepoints snapshot the overlay so nested scopes can
//! roll back independently. Updates and removes honor `expected_version`
//! with compare-and-set semantics, and an optional unique-field simulation
//! produces deterministic constraint errors.

#![allow(dead_code)] // Each suite uses its own subset of the driver surface.

use ormkit::{
    DataTuple, EntityKey, Error, PersistBatch, PersistOp, PreparedCommand, QueryRequest, Result,
    StorageDriver, Value,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Row = (DataTuple, Option<Value>);
type Overlay = HashMap<EntityKey, Option<Row>>;

/// Backing store observed and configured by tests.
#[derive(Default)]
pub struct Store {
    rows: HashMap<EntityKey, Row>,
    overlay: Option<Overlay>,
    savepoints: Vec<(String, Overlay)>,
    /// Simulated unique constraint: field index + constraint name.
    pub unique: Option<(usize, &'static str)>,
    pub batches: usize,
    pub queries: Vec<String>,
    pub prepared_runs: usize,
}

impl Store {
    /// A row as visible through the open transaction, if any.
    pub fn lookup(&self, key: &EntityKey) -> Option<&Row> {
        if let Some(staged) = self.overlay.as_ref().and_then(|o| o.get(key)) {
            return staged.as_ref();
        }
        self.rows.get(key)
    }

    /// Committed row count, ignoring any open transaction.
    pub fn committed_len(&self) -> usize {
        self.rows.len()
    }

    fn visible(&self) -> Vec<(&EntityKey, &Row)> {
        let mut out: Vec<(&EntityKey, &Row)> = Vec::new();
        for (key, row) in &self.rows {
            match self.overlay.as_ref().and_then(|o| o.get(key)) {
                Some(Some(staged)) => out.push((key, staged)),
                Some(None) => {}
                None => out.push((key, row)),
            }
        }
        if let Some(overlay) = &self.overlay {
            for (key, staged) in overlay {
                if let Some(row) = staged.as_ref() {
                    if !self.rows.contains_key(key) {
                        out.push((key, row));
                    }
                }
            }
        }
        out
    }

    fn stage(&mut self, key: EntityKey, row: Option<Row>) {
        match &mut self.overlay {
            Some(overlay) => {
                overlay.insert(key, row);
            }
            None => match row {
                Some(row) => {
                    self.rows.insert(key, row);
                }
                None => {
                    self.rows.remove(&key);
                }
            },
        }
    }

    fn apply(&mut self, op: &PersistOp) -> Result<()> {
        match op {
            PersistOp::Insert { key, data } => {
                if let Some((field, name)) = self.unique {
                    let value = data.get(field)?;
                    let duplicate = self.visible().iter().any(|(other, (row, _))| {
                        *other != key
                            && other.type_name() == key.type_name()
                            && row.get(field).is_ok_and(|v| v == value)
                    });
                    if duplicate {
                        return Err(Error::constraint(name, "duplicate key value"));
                    }
                }
                self.stage(key.clone(), Some((data.clone(), Some(Value::BigInt(1)))));
                Ok(())
            }
            PersistOp::Update {
                key,
                data,
                expected_version,
            } => {
                let current = self
                    .lookup(key)
                    .ok_or_else(|| Error::Custom(format!("row {key} does not exist")))?
                    .clone();
                if let Some(expected) = expected_version {
                    if current.1.as_ref() != Some(expected) {
                        return Err(Error::stale_version(format!(
                            "row {key} was committed by another session"
                        )));
                    }
                }
                let next = current
                    .1
                    .as_ref()
                    .and_then(Value::as_i64)
                    .map_or(Value::BigInt(1), |n| Value::BigInt(n + 1));
                self.stage(key.clone(), Some((data.clone(), Some(next))));
                Ok(())
            }
            PersistOp::Remove {
                key,
                expected_version,
            } => {
                let current = self
                    .lookup(key)
                    .ok_or_else(|| Error::Custom(format!("row {key} does not exist")))?
                    .clone();
                if let Some(expected) = expected_version {
                    if current.1.as_ref() != Some(expected) {
                        return Err(Error::stale_version(format!(
                            "row {key} was committed by another session"
                        )));
                    }
                }
                self.stage(key.clone(), None);
                Ok(())
            }
        }
    }
}

/// In-memory [`StorageDriver`] over a shared [`Store`].
pub struct MemoryDriver {
    state: Arc<Mutex<Store>>,
}

impl MemoryDriver {
    pub fn new() -> (Self, Arc<Mutex<Store>>) {
        let state = Arc::new(Mutex::new(Store::default()));
        (Self::sharing(Arc::clone(&state)), state)
    }

    /// Second driver handle over the same store, for multi-session tests.
    pub fn sharing(state: Arc<Mutex<Store>>) -> Self {
        Self { state }
    }
}

impl StorageDriver for MemoryDriver {
    fn begin(&self) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        store.overlay.get_or_insert_with(HashMap::new);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        if let Some(overlay) = store.overlay.take() {
            for (key, staged) in overlay {
                match staged {
                    Some(row) => {
                        store.rows.insert(key, row);
                    }
                    None => {
                        store.rows.remove(&key);
                    }
                }
            }
        }
        store.savepoints.clear();
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        store.overlay = None;
        store.savepoints.clear();
        Ok(())
    }

    fn savepoint(&self, name: &str) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        let snapshot = store.overlay.clone().unwrap_or_default();
        store.savepoints.push((name.to_string(), snapshot));
        Ok(())
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        let position = store
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| Error::Custom(format!("unknown savepoint {name}")))?;
        store.savepoints.truncate(position + 1);
        let snapshot = store.savepoints[position].1.clone();
        store.overlay = Some(snapshot);
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        if let Some(position) = store.savepoints.iter().rposition(|(n, _)| n == name) {
            store.savepoints.remove(position);
        }
        Ok(())
    }

    fn execute_batch(&self, batch: &PersistBatch) -> Result<()> {
        let mut store = self.state.lock().expect("lock poisoned");
        store.batches += 1;
        // Atomicity: on any failure the pre-batch images are restored.
        let rows_before = store.rows.clone();
        let overlay_before = store.overlay.clone();
        for op in batch.ops() {
            if let Err(e) = store.apply(op) {
                store.rows = rows_before;
                store.overlay = overlay_before;
                return Err(e);
            }
        }
        Ok(())
    }

    fn query(&self, request: &QueryRequest) -> Result<Vec<DataTuple>> {
        let mut store = self.state.lock().expect("lock poisoned");
        store.queries.push(request.statement.clone());
        let mut rows: Vec<(u64, DataTuple)> = store
            .visible()
            .into_iter()
            .map(|(key, (data, _))| (key.key_hash(), data.clone()))
            .collect();
        rows.sort_by_key(|(hash, _)| *hash);
        Ok(rows.into_iter().map(|(_, data)| data).collect())
    }

    fn prepare(&self, statement: &str) -> Result<PreparedCommand> {
        Ok(PreparedCommand::new(1, statement.to_string()))
    }

    fn execute_prepared(
        &self,
        _command: &PreparedCommand,
        _params: &[Value],
    ) -> Result<Vec<DataTuple>> {
        self.state.lock().expect("lock poisoned").prepared_runs += 1;
        Ok(Vec::new())
    }
}

/// Single-column i64 key for the `Hero` test entity.
pub fn hero_key(id: i64) -> EntityKey {
    EntityKey::from_id("Hero", id)
}

/// Two-field tuple: name, age.
pub fn hero_tuple(name: &str, age: i64) -> DataTuple {
    DataTuple::from_values(vec![Value::Text(name.into()), Value::BigInt(age)])
}

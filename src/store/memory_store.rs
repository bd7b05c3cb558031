use super::{StorageError, StorageResult, Table, TabularStore};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process store. Datasets live only as long as the store.
#[derive(Default)]
pub struct MemoryStore {
    datasets: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset names currently held, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Table>> {
        // A poisoned map still holds whole batches; keep using it.
        self.datasets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TabularStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn read(&self, name: &str) -> StorageResult<Table> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })
    }

    fn write(&self, name: &str, table: &Table) -> StorageResult<()> {
        self.lock().insert(name.to_string(), table.clone());
        Ok(())
    }
}

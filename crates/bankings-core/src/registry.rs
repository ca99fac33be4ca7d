use crate::types::AccountRecord;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// What to do with an entry after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Keep,
    Evict,
}

/// Mutex-guarded map from record id to account record.
///
/// Every read-modify-write happens inside a single critical section, so a
/// result update can never interleave with a completion of the same record.
/// Readers only ever receive cloned snapshots.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    records: Mutex<HashMap<String, AccountRecord>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or overwrite. Returns the previous record under the same id.
    pub async fn insert(&self, record: AccountRecord) -> Option<AccountRecord> {
        let mut records = self.records.lock().await;
        records.insert(record.id.clone(), record)
    }

    pub async fn get(&self, id: &str) -> Option<AccountRecord> {
        self.records.lock().await.get(id).cloned()
    }

    /// Apply `f` to the record in place. `None` when the id is absent.
    pub async fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut AccountRecord) -> R) -> Option<R> {
        self.mutate_or_evict(id, |record| (f(record), Retain::Keep))
            .await
    }

    /// Apply `f` and optionally remove the record in the same critical section.
    pub async fn mutate_or_evict<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut AccountRecord) -> (R, Retain),
    ) -> Option<R> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(id)?;
        let (output, retain) = f(record);
        if retain == Retain::Evict {
            records.remove(id);
        }
        Some(output)
    }

    /// Idempotent removal.
    pub async fn remove(&self, id: &str) -> Option<AccountRecord> {
        self.records.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per subject (`g:ops`, `u:alice`, `r:viewer`).
///
/// Held across a whole clear -> rebuild -> commit sequence so two updates of
/// the same subject never interleave. Entries are never evicted; the key
/// space is bounded by the number of subjects.
#[derive(Clone, Default)]
pub struct SubjectLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.inner.entry(key.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

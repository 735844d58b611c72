use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-process advisory locks keyed by idempotency key. Concurrent duplicates
/// serialize here, so the second request observes the stored binding the
/// first one wrote.
#[derive(Clone, Default)]
pub struct IdempotencyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IdempotencyLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut registry = self.inner.lock().await;
            registry
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

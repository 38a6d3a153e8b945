// libs/appointment-cell/src/services/consistency.rs
//
// Serializes the read-check-write sequence per provider inside this process.
// The store's exclusion backstop covers writers in other processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct ProviderLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Held for the duration of one provider's conflict check and write.
pub struct ProviderLockGuard {
    provider_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl ProviderLockGuard {
    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }
}

impl ProviderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, provider_id: Uuid) -> ProviderLockGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds so the map tracks only active providers.
            locks.retain(|id, lock| *id == provider_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(provider_id).or_default())
        };

        debug!("Acquiring scheduling lock for provider {}", provider_id);
        ProviderLockGuard {
            provider_id,
            _guard: lock.lock_owned().await,
        }
    }

    pub async fn tracked_providers(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Process-wide cache of role to permission grants
///
/// Owned by the registry. Readers get an immutable snapshot; any write to the
/// grant tables must call `invalidate` before it reports success.
use crate::{access::RoleName, error::IpamResult, metrics};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub type RolePermissionMap = HashMap<RoleName, BTreeSet<String>>;

#[derive(Default)]
struct CacheState {
    generation: u64,
    snapshot: Option<Arc<RolePermissionMap>>,
}

/// Permission cache with generation-checked fills
#[derive(Default)]
pub struct PermissionCache {
    state: RwLock<CacheState>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot, filling it from `loader` on a miss
    ///
    /// A fill that started before an invalidation is returned to its caller
    /// but never stored.
    pub async fn get<F, Fut>(&self, loader: F) -> IpamResult<Arc<RolePermissionMap>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = IpamResult<RolePermissionMap>>,
    {
        let generation = {
            let state = self.state.read().await;
            if let Some(snapshot) = &state.snapshot {
                metrics::record_cache_access("role_permissions", true);
                return Ok(Arc::clone(snapshot));
            }
            state.generation
        };

        metrics::record_cache_access("role_permissions", false);
        debug!(generation, "Permission cache miss, loading grants");

        let loaded = Arc::new(loader().await?);

        let mut state = self.state.write().await;
        if state.generation == generation {
            state.snapshot = Some(Arc::clone(&loaded));
        }

        Ok(loaded)
    }

    /// Drop the snapshot and bump the generation
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.snapshot = None;
        debug!(generation = state.generation, "Permission cache invalidated");
    }
}

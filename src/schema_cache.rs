use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::ToolSchemas;
use crate::providers::base::ServerIdentity;

static GLOBAL: Lazy<Arc<SchemaCache>> = Lazy::new(|| Arc::new(SchemaCache::new()));

/// Discovered tool schemas keyed by server identity.
///
/// Discovery for an identity is idempotent, so two callers racing to fill the
/// same entry simply write equal values. The lock is never held across I/O.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<ServerIdentity, ToolSchemas>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by clients that were not given their own.
    pub fn global() -> Arc<SchemaCache> {
        Arc::clone(&GLOBAL)
    }

    pub async fn get(&self, identity: &ServerIdentity) -> Option<ToolSchemas> {
        self.entries.read().await.get(identity).cloned()
    }

    pub async fn insert(&self, identity: ServerIdentity, schemas: ToolSchemas) {
        self.entries.write().await.insert(identity, schemas);
    }

    /// Drop one entry so the next fetch rediscovers it. Returns whether it existed.
    pub async fn invalidate(&self, identity: &ServerIdentity) -> bool {
        self.entries.write().await.remove(identity).is_some()
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

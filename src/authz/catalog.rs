//! Permission name -> (url, methods) lookup used to expand role-permission grants.
//!
//! The catalog is built lazily on first use and published as an immutable
//! snapshot; concurrent first users wait on a single build. Permission records
//! added afterwards are not seen until [`PermissionCatalog::build`] runs again.
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, RwLock};

use crate::authz::errors::AuthzError;
use crate::authz::types::{PermissionRecord, ResourceUrl};
use crate::storage;

/// One flattened `{BaseUrl + suffix, methods}` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAction {
    pub url: String,
    pub methods: Vec<String>,
}

/// Immutable view of the permission records at build time.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    entries: BTreeMap<String, Vec<UrlAction>>,
}

impl CatalogSnapshot {
    /// Records sharing a name accumulate; later records never replace earlier ones.
    pub fn from_records(records: &[PermissionRecord]) -> Self {
        let mut entries: BTreeMap<String, Vec<UrlAction>> = BTreeMap::new();
        for record in records {
            entries
                .entry(record.name.clone())
                .or_default()
                .extend(flatten(record));
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Cross product of each entry's url with its methods. Unknown names resolve to nothing.
    pub fn resolve(&self, permission: &str) -> Vec<(String, String)> {
        self.entries
            .get(permission)
            .map(|actions| {
                actions
                    .iter()
                    .flat_map(|a| a.methods.iter().map(|m| (a.url.clone(), m.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn flatten(record: &PermissionRecord) -> Vec<UrlAction> {
    let expand = |ru: &ResourceUrl| UrlAction {
        url: format!("{}{}", record.base_url, ru.url),
        methods: ru.methods.clone(),
    };
    record
        .resource_urls
        .iter()
        .map(expand)
        .chain(record.resource_action_urls.iter().map(expand))
        .collect()
}

/// Where the catalog reads permission records from.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, AuthzError>;
}

#[async_trait]
impl PermissionSource for DatabaseConnection {
    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, AuthzError> {
        storage::list_permissions(self).await
    }
}

#[async_trait]
impl PermissionSource for Vec<PermissionRecord> {
    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, AuthzError> {
        Ok(self.clone())
    }
}

pub struct PermissionCatalog {
    source: Arc<dyn PermissionSource>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    build_lock: Mutex<()>,
}

impl PermissionCatalog {
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            build_lock: Mutex::new(()),
        }
    }

    /// Current snapshot, building it first if nothing has been loaded yet.
    pub async fn snapshot(&self) -> Result<Arc<CatalogSnapshot>, AuthzError> {
        let current = self.current().await;
        if !current.is_empty() {
            return Ok(current);
        }

        let _guard = self.build_lock.lock().await;
        // Another caller may have finished the build while we waited.
        let current = self.current().await;
        if !current.is_empty() {
            return Ok(current);
        }
        self.publish().await
    }

    /// Rebuild from the source and swap the new snapshot in.
    pub async fn build(&self) -> Result<Arc<CatalogSnapshot>, AuthzError> {
        let _guard = self.build_lock.lock().await;
        self.publish().await
    }

    /// Snapshot as last published, without triggering a build.
    pub async fn current(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn resolve(&self, permission: &str) -> Result<Vec<(String, String)>, AuthzError> {
        Ok(self.snapshot().await?.resolve(permission))
    }

    async fn publish(&self) -> Result<Arc<CatalogSnapshot>, AuthzError> {
        let records = self.source.load_permissions().await?;
        let built = Arc::new(CatalogSnapshot::from_records(&records));
        tracing::info!(
            records = records.len(),
            permissions = built.len(),
            "Built permission catalog"
        );
        *self.snapshot.write().await = built.clone();
        Ok(built)
    }
}

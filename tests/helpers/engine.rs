use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use warden::authz::{AuthzError, CasbinEngine, EngineModel, PolicyEngine};

/// Casbin engine whose writes can be made to fail on demand, and whose next
/// full policy listing can be held until released.
pub struct FlakyEngine {
    inner: CasbinEngine,
    fail_writes: AtomicBool,
    pause_full_read: AtomicBool,
    paused: Notify,
    released: Notify,
}

impl FlakyEngine {
    pub async fn new(model: EngineModel) -> Self {
        Self {
            inner: CasbinEngine::new(model).await.expect("Failed to build engine"),
            fail_writes: AtomicBool::new(false),
            pause_full_read: AtomicBool::new(false),
            paused: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Hold the next unfiltered `filtered_policy` call until [`Self::release`].
    pub fn pause_next_full_read(&self) {
        self.pause_full_read.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held read has started waiting.
    pub async fn wait_until_paused(&self) {
        self.paused.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AuthzError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthzError::Engine("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyEngine for FlakyEngine {
    async fn enforce(&self, params: Vec<String>) -> Result<bool, AuthzError> {
        self.inner.enforce(params).await
    }

    async fn add_policies(&self, rules: Vec<Vec<String>>) -> Result<bool, AuthzError> {
        self.check()?;
        self.inner.add_policies(rules).await
    }

    async fn remove_filtered_policy(
        &self,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError> {
        self.check()?;
        self.inner.remove_filtered_policy(field_index, values).await
    }

    async fn filtered_policy(&self, field_index: usize, values: Vec<String>) -> Vec<Vec<String>> {
        let unfiltered = values.iter().all(|v| v.is_empty());
        if unfiltered && self.pause_full_read.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.released.notified().await;
        }
        self.inner.filtered_policy(field_index, values).await
    }

    async fn add_named_grouping_policies(
        &self,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool, AuthzError> {
        self.check()?;
        self.inner.add_named_grouping_policies(ptype, rules).await
    }

    async fn filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Vec<Vec<String>> {
        self.inner
            .filtered_named_grouping_policy(ptype, field_index, values)
            .await
    }

    async fn remove_filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError> {
        self.check()?;
        self.inner
            .remove_filtered_named_grouping_policy(ptype, field_index, values)
            .await
    }
}

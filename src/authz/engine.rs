//! The rule-evaluation engine behind the gateway.
//!
//! [`PolicyEngine`] is the narrow capability the rest of the crate relies on;
//! [`CasbinEngine`] implements it over an in-memory casbin enforcer. Decision
//! caching is never enabled, so every `enforce` sees the latest rule set.
use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::authz::errors::AuthzError;

const ROLE_SCOPE_MODEL: &str = include_str!("models/role_scope.conf");
const URL_ACTION_MODEL: &str = include_str!("models/url_action.conf");

/// Which request shape `enforce` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineModel {
    /// `(sub, ns, proj, org, role)`: does the subject hold the role in scope.
    #[default]
    RoleScope,
    /// `(sub, ns, proj, org, url, method)`: may the subject call the endpoint.
    UrlAction,
}

impl EngineModel {
    pub fn conf(self) -> &'static str {
        match self {
            EngineModel::RoleScope => ROLE_SCOPE_MODEL,
            EngineModel::UrlAction => URL_ACTION_MODEL,
        }
    }
}

#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn enforce(&self, params: Vec<String>) -> Result<bool, AuthzError>;

    async fn add_policies(&self, rules: Vec<Vec<String>>) -> Result<bool, AuthzError>;

    async fn remove_filtered_policy(
        &self,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError>;

    async fn filtered_policy(&self, field_index: usize, values: Vec<String>) -> Vec<Vec<String>>;

    async fn add_named_grouping_policies(
        &self,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool, AuthzError>;

    async fn filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Vec<Vec<String>>;

    async fn remove_filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError>;
}

pub struct CasbinEngine {
    enforcer: RwLock<Enforcer>,
}

impl CasbinEngine {
    pub async fn new(model: EngineModel) -> Result<Self, AuthzError> {
        let model = DefaultModel::from_str(model.conf()).await?;
        let adapter = MemoryAdapter::default();
        let enforcer = Enforcer::new(model, adapter).await?;
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }
}

#[async_trait]
impl PolicyEngine for CasbinEngine {
    async fn enforce(&self, params: Vec<String>) -> Result<bool, AuthzError> {
        let enforcer = self.enforcer.read().await;
        enforcer
            .enforce(params)
            .map_err(|e| AuthzError::InvalidArgument(e.to_string()))
    }

    async fn add_policies(&self, rules: Vec<Vec<String>>) -> Result<bool, AuthzError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer.add_policies(rules).await?)
    }

    async fn remove_filtered_policy(
        &self,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer.remove_filtered_policy(field_index, values).await?)
    }

    async fn filtered_policy(&self, field_index: usize, values: Vec<String>) -> Vec<Vec<String>> {
        let enforcer = self.enforcer.read().await;
        enforcer.get_filtered_policy(field_index, values)
    }

    async fn add_named_grouping_policies(
        &self,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool, AuthzError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer.add_named_grouping_policies(ptype, rules).await?)
    }

    async fn filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Vec<Vec<String>> {
        let enforcer = self.enforcer.read().await;
        enforcer.get_filtered_named_grouping_policy(ptype, field_index, values)
    }

    async fn remove_filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool, AuthzError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer
            .remove_filtered_named_grouping_policy(ptype, field_index, values)
            .await?)
    }
}

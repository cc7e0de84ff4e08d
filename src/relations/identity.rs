//! Identity provider seam used by user management.
//!
//! Accounts in the relational store carry the id the provider hands back, so
//! the provider stays the owner of credentials and profile data.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::errors::AuthzError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTraits {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity and return its id.
    async fn create(&self, traits: &IdentityTraits) -> Result<String, AuthzError>;
    async fn update(&self, id: &str, traits: &IdentityTraits) -> Result<(), AuthzError>;
    async fn delete(&self, id: &str) -> Result<(), AuthzError>;
}

/// In-process provider for standalone deployments and tests.
#[derive(Debug, Default)]
pub struct LocalIdentityProvider {
    identities: DashMap<String, IdentityTraits>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<IdentityTraits> {
        self.identities.get(id).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create(&self, traits: &IdentityTraits) -> Result<String, AuthzError> {
        if self.identities.iter().any(|t| t.username == traits.username) {
            return Err(AuthzError::Identity(format!(
                "identity '{}' already exists",
                traits.username
            )));
        }
        let id = Uuid::new_v4().to_string();
        self.identities.insert(id.clone(), traits.clone());
        Ok(id)
    }

    async fn update(&self, id: &str, traits: &IdentityTraits) -> Result<(), AuthzError> {
        match self.identities.get_mut(id) {
            Some(mut entry) => {
                *entry = traits.clone();
                Ok(())
            }
            None => Err(AuthzError::Identity(format!("unknown identity {id}"))),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), AuthzError> {
        self.identities.remove(id);
        Ok(())
    }
}

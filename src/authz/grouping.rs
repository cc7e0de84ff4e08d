//! Typed views over the engine's two grouping relations.
//!
//! Membership (`u:<user>` -> `g:<group>`) and role-permission bindings
//! (`url` -> `role` for `method`) share one storage mechanism in the engine;
//! each gets its own [`GroupingStore`] so callers never pass a kind tag around.
use std::marker::PhantomData;
use std::sync::Arc;

use crate::authz::engine::PolicyEngine;
use crate::authz::errors::AuthzError;
use crate::authz::translate::{to_grouping, GroupingTuple};
use crate::authz::types::{RolePermissionRule, UserGroup};

pub trait GroupingKind: Send + Sync + 'static {
    /// Grouping section name in the engine model.
    const PTYPE: &'static str;
    type Tuple: GroupingTuple;
}

/// User-to-group membership.
pub struct Membership;

impl GroupingKind for Membership {
    const PTYPE: &'static str = "g2";
    type Tuple = UserGroup;
}

/// Role-to-endpoint binding produced from role-permission mappings.
pub struct RoleBinding;

impl GroupingKind for RoleBinding {
    const PTYPE: &'static str = "g";
    type Tuple = RolePermissionRule;
}

pub struct GroupingStore<K> {
    engine: Arc<dyn PolicyEngine>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for GroupingStore<K> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: GroupingKind> GroupingStore<K> {
    pub fn new(engine: Arc<dyn PolicyEngine>) -> Self {
        Self {
            engine,
            _kind: PhantomData,
        }
    }

    /// Empty filter values match anything.
    pub async fn list(&self, field_index: usize, filter: Vec<String>) -> Vec<K::Tuple> {
        let rules = self
            .engine
            .filtered_named_grouping_policy(K::PTYPE, field_index, filter)
            .await;
        to_grouping(rules)
    }

    pub async fn all(&self) -> Vec<K::Tuple> {
        self.list(0, vec![String::new(); <K::Tuple as GroupingTuple>::ARITY]).await
    }

    pub async fn add(&self, tuples: Vec<K::Tuple>) -> Result<bool, AuthzError> {
        if tuples.is_empty() {
            return Ok(false);
        }
        let rules = tuples.into_iter().map(GroupingTuple::into_rule).collect();
        self.engine.add_named_grouping_policies(K::PTYPE, rules).await
    }

    pub async fn remove(&self, field_index: usize, filter: Vec<String>) -> Result<bool, AuthzError> {
        self.engine
            .remove_filtered_named_grouping_policy(K::PTYPE, field_index, filter)
            .await
    }

    /// Remove exactly one tuple.
    pub async fn remove_exact(&self, tuple: K::Tuple) -> Result<bool, AuthzError> {
        self.remove(0, tuple.into_rule()).await
    }
}

//! Brings the engine in line with the relational store.
//!
//! The engine adapter is in-memory, so this runs at startup to load the rule
//! set and optionally on a schedule to repair drift left by failed tuple
//! commits.

use std::collections::BTreeSet;

use sea_orm::ConnectionTrait;
use serde::Serialize;

use crate::authz::errors::AuthzError;
use crate::authz::service::EnforcementGateway;
use crate::authz::translate;
use crate::authz::types::{Policy, RolePermissionRule, UserGroup};
use crate::storage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.added + self.removed
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.added += other.added;
        self.removed += other.removed;
    }
}

/// Add every tuple the relational store implies and the engine lacks. With
/// `prune`, also remove engine tuples that have no relational counterpart.
///
/// Holds the gateway's reconcile barrier for the whole pass, so subject
/// updates wait until the diff is applied.
pub async fn reconcile<C: ConnectionTrait>(
    db: &C,
    authz: &EnforcementGateway,
    prune: bool,
) -> Result<ReconcileReport, AuthzError> {
    let _barrier = authz.reconcile_guard().await;
    let mut report = ReconcileReport::default();
    report.merge(reconcile_policies(db, authz, prune).await?);
    report.merge(reconcile_memberships(db, authz, prune).await?);
    report.merge(reconcile_role_bindings(db, authz, prune).await?);
    tracing::info!(added = report.added, removed = report.removed, prune, "Reconciled engine");
    Ok(report)
}

/// Split into (missing from live, extra in live).
fn diff<T: Ord + Clone>(desired: Vec<T>, live: Vec<T>) -> (Vec<T>, Vec<T>) {
    let desired: BTreeSet<T> = desired.into_iter().collect();
    let live: BTreeSet<T> = live.into_iter().collect();
    let missing = desired.difference(&live).cloned().collect();
    let extra = live.difference(&desired).cloned().collect();
    (missing, extra)
}

async fn reconcile_policies<C: ConnectionTrait>(
    db: &C,
    authz: &EnforcementGateway,
    prune: bool,
) -> Result<ReconcileReport, AuthzError> {
    let desired = storage::desired_policies(db).await?;
    let live = authz.list_policies(&Policy::default()).await;
    let (missing, extra) = diff(desired, live);

    let mut report = ReconcileReport::default();
    if !missing.is_empty() && authz.create_policies(&missing).await? {
        report.added += missing.len();
    }
    if prune {
        for policy in extra {
            if authz.delete_policies(&policy).await? {
                report.removed += 1;
            }
        }
    }
    Ok(report)
}

async fn reconcile_memberships<C: ConnectionTrait>(
    db: &C,
    authz: &EnforcementGateway,
    prune: bool,
) -> Result<ReconcileReport, AuthzError> {
    let desired = storage::desired_memberships(db).await?;
    let live = authz.list_user_groups(&UserGroup::default()).await;
    let (missing, extra) = diff(desired, live);

    let mut report = ReconcileReport::default();
    if !missing.is_empty() && authz.create_user_groups(&missing).await? {
        report.added += missing.len();
    }
    if prune {
        for user_group in extra {
            if authz.delete_user_groups(&user_group).await? {
                report.removed += 1;
            }
        }
    }
    Ok(report)
}

async fn reconcile_role_bindings<C: ConnectionTrait>(
    db: &C,
    authz: &EnforcementGateway,
    prune: bool,
) -> Result<ReconcileReport, AuthzError> {
    let grants = storage::role_permission_grants(db).await?;
    // Permission records may have changed since the catalog was first built.
    let catalog = authz.catalog().build().await?;
    let desired: Vec<RolePermissionRule> = translate::expand_role_permission_mappings(&grants, &catalog)?;
    let live = authz.list_role_permission_rules("").await;
    let (missing, extra) = diff(desired, live);

    let mut report = ReconcileReport::default();
    if !missing.is_empty() && authz.role_bindings().add(missing.clone()).await? {
        report.added += missing.len();
    }
    if prune {
        for rule in extra {
            if authz.role_bindings().remove_exact(rule).await? {
                report.removed += 1;
            }
        }
    }
    Ok(report)
}

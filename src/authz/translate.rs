//! Conversion between domain objects and the flat string rules the engine stores.
use std::collections::{BTreeMap, BTreeSet};

use crate::authz::catalog::CatalogSnapshot;
use crate::authz::errors::AuthzError;
use crate::authz::types::{Policy, RolePermissionMapping, RolePermissionRule, UserGroup};

/// A fixed-arity grouping relation that round-trips through engine rules.
pub trait GroupingTuple: Sized + Send + 'static {
    const ARITY: usize;

    fn into_rule(self) -> Vec<String>;

    /// `None` when the rule has the wrong arity.
    fn from_rule(rule: &[String]) -> Option<Self>;
}

impl GroupingTuple for UserGroup {
    const ARITY: usize = 2;

    fn into_rule(self) -> Vec<String> {
        vec![self.user, self.grp]
    }

    fn from_rule(rule: &[String]) -> Option<Self> {
        match rule {
            [user, grp] => Some(UserGroup::new(user, grp)),
            _ => None,
        }
    }
}

impl GroupingTuple for RolePermissionRule {
    const ARITY: usize = 3;

    fn into_rule(self) -> Vec<String> {
        vec![self.url, self.role, self.method]
    }

    fn from_rule(rule: &[String]) -> Option<Self> {
        match rule {
            [url, role, method] => Some(RolePermissionRule::new(url, role, method)),
            _ => None,
        }
    }
}

pub fn to_policies(rules: Vec<Vec<String>>) -> Vec<Policy> {
    rules
        .into_iter()
        .filter_map(|rule| match rule.as_slice() {
            [sub, ns, proj, org, obj] => Some(Policy::new(sub, ns, proj, org, obj)),
            _ => {
                tracing::warn!(?rule, "Skipping policy rule with unexpected arity");
                None
            }
        })
        .collect()
}

/// Validate and flatten policies. Rejects the whole batch on the first empty field.
pub fn from_policies(policies: &[Policy]) -> Result<Vec<Vec<String>>, AuthzError> {
    policies
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let fields = p.fields();
            if fields.iter().any(|f| f.is_empty()) {
                return Err(AuthzError::InvalidArgument(format!(
                    "index {i}: policy elements do not meet definition"
                )));
            }
            Ok(fields.iter().map(|f| f.to_string()).collect())
        })
        .collect()
}

pub fn to_user_groups(rules: Vec<Vec<String>>) -> Vec<UserGroup> {
    to_grouping(rules)
}

pub fn from_user_groups(user_groups: &[UserGroup]) -> Result<Vec<Vec<String>>, AuthzError> {
    user_groups
        .iter()
        .enumerate()
        .map(|(i, ug)| {
            if ug.user.is_empty() || ug.grp.is_empty() {
                return Err(AuthzError::InvalidArgument(format!(
                    "index {i}: request elements do not meet definition"
                )));
            }
            Ok(ug.clone().into_rule())
        })
        .collect()
}

pub fn to_grouping<T: GroupingTuple>(rules: Vec<Vec<String>>) -> Vec<T> {
    rules
        .into_iter()
        .filter_map(|rule| {
            let parsed = T::from_rule(&rule);
            if parsed.is_none() {
                tracing::warn!(?rule, arity = T::ARITY, "Skipping grouping rule with unexpected arity");
            }
            parsed
        })
        .collect()
}

/// Expand each (role, [permission]) pair into one rule per resolved (url, method).
///
/// Permission names the catalog does not know contribute nothing.
pub fn expand_role_permission_mappings(
    mappings: &[RolePermissionMapping],
    catalog: &CatalogSnapshot,
) -> Result<Vec<RolePermissionRule>, AuthzError> {
    let mut rules = Vec::new();
    for (i, mapping) in mappings.iter().enumerate() {
        if mapping.role.is_empty() {
            return Err(AuthzError::InvalidArgument(format!(
                "index {i}: mapping elements do not meet definition"
            )));
        }
        for permission in &mapping.permission {
            for (url, method) in catalog.resolve(permission) {
                if url.is_empty() || method.is_empty() {
                    return Err(AuthzError::InvalidArgument(format!(
                        "index {i}: mapping elements do not meet definition"
                    )));
                }
                rules.push(RolePermissionRule::new(&url, &mapping.role, &method));
            }
        }
    }
    Ok(rules)
}

/// Collapse role-grouping rules back to permission names, one mapping per role.
///
/// A permission is reported for a role when every (url, method) it resolves to
/// is granted to that role.
pub fn collapse_role_permission_rules(
    rules: &[RolePermissionRule],
    catalog: &CatalogSnapshot,
) -> Vec<RolePermissionMapping> {
    let mut granted: BTreeMap<&str, BTreeSet<(&str, &str)>> = BTreeMap::new();
    for rule in rules {
        granted
            .entry(rule.role.as_str())
            .or_default()
            .insert((rule.url.as_str(), rule.method.as_str()));
    }

    granted
        .into_iter()
        .map(|(role, pairs)| {
            let permission = catalog
                .names()
                .filter(|name| {
                    let resolved = catalog.resolve(name);
                    !resolved.is_empty()
                        && resolved
                            .iter()
                            .all(|(url, method)| pairs.contains(&(url.as_str(), method.as_str())))
                })
                .map(str::to_string)
                .collect();
            RolePermissionMapping {
                role: role.to_string(),
                permission,
            }
        })
        .collect()
}

//! Role-assignment scoping: which relational table a binding lives in and the
//! wildcard-normalized fields of the policy tuple it produces.
use std::sync::LazyLock;

use regex::Regex;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};

use crate::authz::errors::AuthzError;
use crate::authz::types::{Policy, WILDCARD};
use crate::storage;

static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("namespace pattern compiles")
});

/// Kind of subject a binding is made for; fixes the engine subject prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Group,
    User,
}

impl SubjectKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SubjectKind::Group => "g",
            SubjectKind::User => "u",
        }
    }

    /// Engine subject identifier, e.g. `g:ops`.
    pub fn subject(self, name: &str) -> String {
        format!("{}:{}", self.prefix(), name)
    }
}

/// A role-assignment request as it arrives at the management surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectNamespaceRole {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ProjectNamespaceRole {
    pub fn new(role: &str, project: Option<&str>, namespace: Option<&str>) -> Self {
        Self {
            role: role.to_string(),
            project: project.map(str::to_string),
            namespace: namespace.map(str::to_string),
        }
    }
}

/// Exactly one of the three assignment tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Project { project: String },
    Namespace { project: String, namespace: String },
}

impl Scope {
    /// First match wins: namespace, then project, then global.
    ///
    /// A namespace without a project is rejected rather than resolved against
    /// an empty project name.
    pub fn classify(project: Option<&str>, namespace: Option<&str>) -> Result<Self, AuthzError> {
        let project = project.map(str::trim).filter(|p| !p.is_empty());
        let namespace = namespace.map(str::trim).filter(|n| !n.is_empty());

        match (project, namespace) {
            (Some(project), Some(namespace)) => {
                validate_namespace(namespace)?;
                Ok(Scope::Namespace {
                    project: project.to_string(),
                    namespace: namespace.to_string(),
                })
            }
            (None, Some(namespace)) => Err(AuthzError::InvalidArgument(format!(
                "namespace {namespace:?} requires a project"
            ))),
            (Some(project), None) => Ok(Scope::Project {
                project: project.to_string(),
            }),
            (None, None) => Ok(Scope::Global),
        }
    }

    pub fn project(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Project { project } | Scope::Namespace { project, .. } => Some(project),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Namespace { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    /// Build the policy tuple for `subject` holding `role` in `org` at this scope.
    pub fn policy(&self, subject: &str, org: &str, role: &str) -> Policy {
        Policy::new(
            subject,
            self.namespace().unwrap_or(WILDCARD),
            self.project().unwrap_or(WILDCARD),
            org,
            role,
        )
    }
}

pub fn validate_namespace(namespace: &str) -> Result<(), AuthzError> {
    if namespace.is_empty() || namespace.len() > 63 {
        return Err(AuthzError::InvalidArgument(format!(
            "namespace {namespace:?} is invalid. must be no more than 63 characters"
        )));
    }
    if !NAMESPACE_RE.is_match(namespace) {
        return Err(AuthzError::InvalidArgument(format!(
            "namespace {namespace:?} is invalid"
        )));
    }
    Ok(())
}

/// A role assignment resolved against the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssignment {
    pub role_id: String,
    pub scope: Scope,
    pub project_id: Option<String>,
    pub policy: Policy,
}

/// Resolves role assignments for one subject within its organization.
pub struct ScopeResolver<'a> {
    pub kind: SubjectKind,
    pub subject_name: &'a str,
    pub organization: &'a str,
    pub partner_id: &'a str,
    pub organization_id: &'a str,
}

impl ScopeResolver<'_> {
    /// Fails without emitting anything if the role or project is unknown.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        db: &C,
        request: &ProjectNamespaceRole,
    ) -> Result<ResolvedAssignment, AuthzError> {
        let scope = Scope::classify(request.project.as_deref(), request.namespace.as_deref())?;

        let role = storage::find_role_by_name(db, &request.role, self.partner_id, self.organization_id)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find role '{}'", request.role)))?;

        let project_id = match scope.project() {
            Some(project) => Some(
                storage::find_project_by_name(db, project, self.organization_id)
                    .await?
                    .ok_or_else(|| {
                        AuthzError::NotFound(format!("unable to find project '{project}'"))
                    })?
                    .id,
            ),
            None => None,
        };

        let policy = scope.policy(&self.kind.subject(self.subject_name), self.organization, &role.name);
        Ok(ResolvedAssignment {
            role_id: role.id,
            scope,
            project_id,
            policy,
        })
    }
}

use sea_orm::DatabaseConnection;
use warden::authz::scope::ProjectNamespaceRole;
use warden::entities;
use warden::relations::{Group, GroupSpec, Metadata, Role, RoleSpec, User, UserSpec};
use warden::storage::{self, NewRole, Tenant};

use super::db::{ORG, PARTNER};

fn metadata(name: &str) -> Metadata {
    Metadata {
        name: name.to_string(),
        partner: PARTNER.to_string(),
        organization: ORG.to_string(),
        description: None,
    }
}

/// Builder for role rows written straight to the relational store
pub struct RoleBuilder {
    name: String,
    scope: String,
    is_global: bool,
    builtin: bool,
    permissions: Vec<String>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: "project".to_string(),
            is_global: false,
            builtin: false,
            permissions: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection, tenant: &Tenant) -> entities::role::Model {
        let role = storage::insert_role(
            db,
            NewRole {
                name: &self.name,
                description: None,
                is_global: self.is_global,
                scope: &self.scope,
                builtin: self.builtin,
            },
            tenant,
        )
        .await
        .expect("Failed to create test role");

        let ids = storage::resolve_permission_ids(db, &self.permissions)
            .await
            .expect("Failed to resolve permissions");
        storage::replace_role_permissions(db, &role.id, &ids)
            .await
            .expect("Failed to bind permissions");
        role
    }

    /// Request body for the role management API
    pub fn spec(self) -> Role {
        Role {
            metadata: metadata(&self.name),
            spec: RoleSpec {
                is_global: self.is_global,
                scope: self.scope,
                rolepermissions: self.permissions,
                builtin: self.builtin,
            },
        }
    }
}

/// Builder for group management requests
pub struct GroupBuilder {
    name: String,
    users: Vec<String>,
    roles: Vec<ProjectNamespaceRole>,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            users: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_user(mut self, username: &str) -> Self {
        self.users.push(username.to_string());
        self
    }

    pub fn with_role(mut self, role: &str, project: Option<&str>, namespace: Option<&str>) -> Self {
        self.roles.push(ProjectNamespaceRole::new(role, project, namespace));
        self
    }

    pub fn build(self) -> Group {
        Group {
            metadata: metadata(&self.name),
            spec: GroupSpec {
                users: self.users,
                project_namespace_roles: self.roles,
                group_type: None,
            },
        }
    }
}

/// Builder for user management requests
pub struct UserBuilder {
    username: String,
    groups: Vec<String>,
    roles: Vec<ProjectNamespaceRole>,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            groups: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.groups.push(group.to_string());
        self
    }

    pub fn with_role(mut self, role: &str, project: Option<&str>, namespace: Option<&str>) -> Self {
        self.roles.push(ProjectNamespaceRole::new(role, project, namespace));
        self
    }

    pub fn build(self) -> User {
        User {
            metadata: metadata(&self.username),
            spec: UserSpec {
                first_name: None,
                last_name: None,
                groups: self.groups,
                project_namespace_roles: self.roles,
            },
        }
    }
}

pub mod account;
pub mod account_role;
pub mod group;
pub mod group_account;
pub mod group_role;
pub mod job_execution;
pub mod organization;
pub mod partner;
pub mod permission;
pub mod project;
pub mod project_account_namespace_role;
pub mod project_account_role;
pub mod project_group_namespace_role;
pub mod project_group_role;
pub mod role;
pub mod role_permission;

pub use account::Entity as Account;
pub use account_role::Entity as AccountRole;
pub use group::Entity as Group;
pub use group_account::Entity as GroupAccount;
pub use group_role::Entity as GroupRole;
pub use job_execution::Entity as JobExecution;
pub use organization::Entity as Organization;
pub use partner::Entity as Partner;
pub use permission::Entity as Permission;
pub use project::Entity as Project;
pub use project_account_namespace_role::Entity as ProjectAccountNamespaceRole;
pub use project_account_role::Entity as ProjectAccountRole;
pub use project_group_namespace_role::Entity as ProjectGroupNamespaceRole;
pub use project_group_role::Entity as ProjectGroupRole;
pub use role::Entity as Role;
pub use role_permission::Entity as RolePermission;

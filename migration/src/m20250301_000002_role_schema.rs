use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250301_000001_tenancy_schema::auto_id;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Which optional columns a subject-role scope table carries.
#[derive(Clone, Copy)]
enum Tier {
    Global,
    Project,
    Namespace,
}

fn scope_table<T>(backend: sea_orm::DatabaseBackend, table: T, subject: ScopeCol, tier: Tier) -> TableCreateStatement
where
    T: IntoIden + 'static,
{
    let mut stmt = Table::create();
    stmt.table(table)
        .if_not_exists()
        .col(auto_id(backend, ScopeCol::Id))
        .col(string(subject))
        .col(string(ScopeCol::RoleId))
        .col(string(ScopeCol::PartnerId))
        .col(string(ScopeCol::OrganizationId))
        .col(boolean(ScopeCol::Active).default(true))
        .col(big_integer(ScopeCol::CreatedAt));
    match tier {
        Tier::Global => {}
        Tier::Project => {
            stmt.col(string(ScopeCol::ProjectId));
        }
        Tier::Namespace => {
            stmt.col(string(ScopeCol::ProjectId));
            stmt.col(string(ScopeCol::Namespace));
        }
    }
    stmt.to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Roles::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Roles::Name))
                    .col(string_null(Roles::Description))
                    .col(boolean(Roles::IsGlobal).default(false))
                    .col(string(Roles::Scope))
                    .col(boolean(Roles::Builtin).default(false))
                    .col(string(Roles::PartnerId))
                    .col(string(Roles::OrganizationId))
                    .col(boolean(Roles::Trash).default(false))
                    .col(big_integer(Roles::CreatedAt))
                    .col(big_integer(Roles::ModifiedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_roles_name")
                    .table(Roles::Table)
                    .col(Roles::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Permissions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Permissions::Name))
                    .col(string(Permissions::BaseUrl))
                    .col(text(Permissions::ResourceUrls))
                    .col(text(Permissions::ResourceActionUrls))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permissions_name")
                    .table(Permissions::Table)
                    .col(Permissions::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermissions::Table)
                    .if_not_exists()
                    .col(auto_id(backend, RolePermissions::Id))
                    .col(string(RolePermissions::RoleId))
                    .col(string(RolePermissions::PermissionId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_role_permissions_role")
                    .table(RolePermissions::Table)
                    .col(RolePermissions::RoleId)
                    .to_owned(),
            )
            .await?;

        // Subject-role bindings, one table per (subject kind, scope tier)
        manager
            .create_table(scope_table(backend, GroupRoles::Table, ScopeCol::GroupId, Tier::Global))
            .await?;
        manager
            .create_table(scope_table(
                backend,
                ProjectGroupRoles::Table,
                ScopeCol::GroupId,
                Tier::Project,
            ))
            .await?;
        manager
            .create_table(scope_table(
                backend,
                ProjectGroupNamespaceRoles::Table,
                ScopeCol::GroupId,
                Tier::Namespace,
            ))
            .await?;
        manager
            .create_table(scope_table(
                backend,
                AccountRoles::Table,
                ScopeCol::AccountId,
                Tier::Global,
            ))
            .await?;
        manager
            .create_table(scope_table(
                backend,
                ProjectAccountRoles::Table,
                ScopeCol::AccountId,
                Tier::Project,
            ))
            .await?;
        manager
            .create_table(scope_table(
                backend,
                ProjectAccountNamespaceRoles::Table,
                ScopeCol::AccountId,
                Tier::Namespace,
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectAccountNamespaceRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectAccountRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccountRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectGroupNamespaceRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectGroupRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RolePermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Id,
    Name,
    Description,
    IsGlobal,
    Scope,
    Builtin,
    PartnerId,
    OrganizationId,
    Trash,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Id,
    Name,
    BaseUrl,
    ResourceUrls,
    ResourceActionUrls,
}

#[derive(DeriveIden)]
enum RolePermissions {
    Table,
    Id,
    RoleId,
    PermissionId,
}

#[derive(DeriveIden)]
enum ScopeCol {
    Id,
    GroupId,
    AccountId,
    RoleId,
    ProjectId,
    Namespace,
    PartnerId,
    OrganizationId,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum GroupRoles {
    Table,
}

#[derive(DeriveIden)]
enum ProjectGroupRoles {
    Table,
}

#[derive(DeriveIden)]
enum ProjectGroupNamespaceRoles {
    Table,
}

#[derive(DeriveIden)]
enum AccountRoles {
    Table,
}

#[derive(DeriveIden)]
enum ProjectAccountRoles {
    Table,
}

#[derive(DeriveIden)]
enum ProjectAccountNamespaceRoles {
    Table,
}

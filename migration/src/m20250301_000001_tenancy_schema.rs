use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Auto-increment id with the column type each backend needs for rowid aliasing.
pub(crate) fn auto_id<T: IntoIden + 'static>(backend: sea_orm::DatabaseBackend, col: T) -> ColumnDef {
    match backend {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(col)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(col)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Partners::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Partners::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_uniq(Partners::Name))
                    .col(string_null(Partners::Description))
                    .col(boolean(Partners::Trash).default(false))
                    .col(big_integer(Partners::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Organizations::Name))
                    .col(string(Organizations::PartnerId))
                    .col(boolean(Organizations::Trash).default(false))
                    .col(big_integer(Organizations::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organizations_partner")
                            .from(Organizations::Table, Organizations::PartnerId)
                            .to(Partners::Table, Partners::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Projects::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Projects::Name))
                    .col(string(Projects::PartnerId))
                    .col(string(Projects::OrganizationId))
                    .col(boolean(Projects::Trash).default(false))
                    .col(big_integer(Projects::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_organization")
                            .from(Projects::Table, Projects::OrganizationId)
                            .to(Organizations::Table, Organizations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_projects_name")
                    .table(Projects::Table)
                    .col(Projects::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Accounts::Username))
                    .col(string_null(Accounts::FirstName))
                    .col(string_null(Accounts::LastName))
                    .col(string(Accounts::PartnerId))
                    .col(string(Accounts::OrganizationId))
                    .col(boolean(Accounts::Trash).default(false))
                    .col(big_integer(Accounts::CreatedAt))
                    .col(big_integer(Accounts::ModifiedAt))
                    .to_owned(),
            )
            .await?;

        // Soft-deleted accounts keep their username, so this is not unique.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_accounts_username")
                    .table(Accounts::Table)
                    .col(Accounts::Username)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Groups::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Groups::Name))
                    .col(string_null(Groups::Description))
                    .col(string_null(Groups::GroupType))
                    .col(string(Groups::PartnerId))
                    .col(string(Groups::OrganizationId))
                    .col(boolean(Groups::Trash).default(false))
                    .col(big_integer(Groups::CreatedAt))
                    .col(big_integer(Groups::ModifiedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_groups_tenant_name")
                    .table(Groups::Table)
                    .col(Groups::OrganizationId)
                    .col(Groups::Name)
                    .to_owned(),
            )
            .await?;

        let backend = manager.get_database_backend();
        manager
            .create_table(
                Table::create()
                    .table(GroupAccounts::Table)
                    .if_not_exists()
                    .col(auto_id(backend, GroupAccounts::Id))
                    .col(string(GroupAccounts::GroupId))
                    .col(string(GroupAccounts::AccountId))
                    .col(boolean(GroupAccounts::Active).default(true))
                    .col(big_integer(GroupAccounts::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_group_accounts_group")
                    .table(GroupAccounts::Table)
                    .col(GroupAccounts::GroupId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Partners::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Partners {
    Table,
    Id,
    Name,
    Description,
    Trash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    PartnerId,
    Trash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    Name,
    PartnerId,
    OrganizationId,
    Trash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
    Username,
    FirstName,
    LastName,
    PartnerId,
    OrganizationId,
    Trash,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
enum Groups {
    Table,
    Id,
    Name,
    Description,
    GroupType,
    PartnerId,
    OrganizationId,
    Trash,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
enum GroupAccounts {
    Table,
    Id,
    GroupId,
    AccountId,
    Active,
    CreatedAt,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create organizations table
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizations::Name).text().not_null())
                    .col(ColumnDef::new(Organizations::Slug).text().not_null())
                    .col(ColumnDef::new(Organizations::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Organizations::UpdatedAt).timestamp().not_null())
                    .index(
                        Index::create()
                            .name("idx_organizations_slug")
                            .table(Organizations::Table)
                            .col(Organizations::Slug)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create projects table
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Projects::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Projects::OrganizationId).integer().not_null())
                    .col(ColumnDef::new(Projects::Name).text().not_null())
                    .col(ColumnDef::new(Projects::Description).text())
                    .col(ColumnDef::new(Projects::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Projects::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_organization_id")
                            .from(Projects::Table, Projects::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create item_types table
        manager
            .create_table(
                Table::create()
                    .table(ItemTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ItemTypes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ItemTypes::Slug).text().not_null())
                    .col(ColumnDef::new(ItemTypes::Name).text().not_null())
                    .col(ColumnDef::new(ItemTypes::Level).integer().not_null())
                    .col(ColumnDef::new(ItemTypes::OrganizationId).integer())
                    .col(ColumnDef::new(ItemTypes::IsSystem).boolean().not_null().default(false))
                    .col(ColumnDef::new(ItemTypes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ItemTypes::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_item_types_organization_id")
                            .from(ItemTypes::Table, ItemTypes::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create plan_items table
        manager
            .create_table(
                Table::create()
                    .table(PlanItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PlanItems::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(PlanItems::ProjectId).integer().not_null())
                    .col(ColumnDef::new(PlanItems::ParentId).text())
                    .col(ColumnDef::new(PlanItems::ItemTypeId).integer().not_null())
                    .col(ColumnDef::new(PlanItems::Name).text().not_null())
                    .col(ColumnDef::new(PlanItems::Status).text().not_null().default("not_started"))
                    .col(ColumnDef::new(PlanItems::Owner).text())
                    .col(ColumnDef::new(PlanItems::StartDate).date())
                    .col(ColumnDef::new(PlanItems::TargetEndDate).date())
                    .col(ColumnDef::new(PlanItems::ActualEndDate).date())
                    .col(ColumnDef::new(PlanItems::Notes).text())
                    .col(ColumnDef::new(PlanItems::Path).text().not_null())
                    .col(ColumnDef::new(PlanItems::Depth).integer().not_null().default(0))
                    .col(ColumnDef::new(PlanItems::SortOrder).integer().not_null().default(0))
                    .col(ColumnDef::new(PlanItems::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(PlanItems::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(PlanItems::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plan_items_project_id")
                            .from(PlanItems::Table, PlanItems::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plan_items_item_type_id")
                            .from(PlanItems::Table, PlanItems::ItemTypeId)
                            .to(ItemTypes::Table, ItemTypes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plan_items_parent_id")
                            .from(PlanItems::Table, PlanItems::ParentId)
                            .to(PlanItems::Table, PlanItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create plan_item_history table
        manager
            .create_table(
                Table::create()
                    .table(PlanItemHistory::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PlanItemHistory::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(PlanItemHistory::PlanItemId).text().not_null())
                    .col(ColumnDef::new(PlanItemHistory::Field).text().not_null())
                    .col(ColumnDef::new(PlanItemHistory::OldValue).text())
                    .col(ColumnDef::new(PlanItemHistory::NewValue).text())
                    .col(ColumnDef::new(PlanItemHistory::ChangedByUserId).text())
                    .col(ColumnDef::new(PlanItemHistory::ChangedByEmail).text())
                    .col(ColumnDef::new(PlanItemHistory::ChangeReason).text().not_null())
                    .col(ColumnDef::new(PlanItemHistory::EvidenceContentIds).json().not_null())
                    .col(ColumnDef::new(PlanItemHistory::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plan_item_history_plan_item_id")
                            .from(PlanItemHistory::Table, PlanItemHistory::PlanItemId)
                            .to(PlanItems::Table, PlanItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create indexes for performance
        manager
            .create_index(
                Index::create()
                    .name("idx_projects_organization_id")
                    .table(Projects::Table)
                    .col(Projects::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_item_types_org_level")
                    .table(ItemTypes::Table)
                    .col(ItemTypes::OrganizationId)
                    .col(ItemTypes::Level)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_plan_items_project_id")
                    .table(PlanItems::Table)
                    .col(PlanItems::ProjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_plan_items_parent_id")
                    .table(PlanItems::Table)
                    .col(PlanItems::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_plan_item_history_plan_item_id")
                    .table(PlanItemHistory::Table)
                    .col(PlanItemHistory::PlanItemId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlanItemHistory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PlanItems::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ItemTypes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    Slug,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    OrganizationId,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ItemTypes {
    Table,
    Id,
    Slug,
    Name,
    Level,
    OrganizationId,
    IsSystem,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlanItems {
    Table,
    Id,
    ProjectId,
    ParentId,
    ItemTypeId,
    Name,
    Status,
    Owner,
    StartDate,
    TargetEndDate,
    ActualEndDate,
    Notes,
    Path,
    Depth,
    SortOrder,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlanItemHistory {
    Table,
    Id,
    PlanItemId,
    Field,
    OldValue,
    NewValue,
    ChangedByUserId,
    ChangedByEmail,
    ChangeReason,
    EvidenceContentIds,
    CreatedAt,
}

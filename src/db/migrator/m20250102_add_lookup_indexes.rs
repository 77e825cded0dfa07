use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Public listing: is_public AND moderation_status, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_files_public_listing")
                    .table(Files::Table)
                    .col(Files::IsPublic)
                    .col(Files::ModerationStatus)
                    .col(Files::UploadedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_files_owner")
                    .table(Files::Table)
                    .col(Files::OwnerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_auth_tokens_user_kind")
                    .table(AuthTokens::Table)
                    .col(AuthTokens::UserId)
                    .col(AuthTokens::Kind)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_auth_tokens_user_kind")
                    .table(AuthTokens::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_files_owner").table(Files::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_files_public_listing")
                    .table(Files::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Files {
    Table,
    OwnerId,
    IsPublic,
    ModerationStatus,
    UploadedAt,
}

#[derive(DeriveIden)]
enum AuthTokens {
    Table,
    UserId,
    Kind,
}

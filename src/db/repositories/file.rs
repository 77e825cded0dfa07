use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::warn;

use crate::db::{format_timestamp, parse_timestamp};
use crate::entities::files;
use crate::models::{FileRecord, ModerationStatus};

impl From<files::Model> for FileRecord {
    fn from(model: files::Model) -> Self {
        let moderation_status = model.moderation_status.parse().unwrap_or_else(|e| {
            warn!(file_id = %model.id, "{e}; treating as PENDING");
            ModerationStatus::Pending
        });

        Self {
            id: model.id,
            owner_id: model.owner_id,
            file_name: model.file_name,
            content_type: model.content_type,
            size: model.size_bytes,
            is_public: model.is_public,
            moderation_status,
            upload_date: parse_timestamp(&model.uploaded_at),
        }
    }
}

pub struct FileRepository {
    conn: DatabaseConnection,
}

impl FileRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, record: &FileRecord) -> Result<()> {
        files::ActiveModel {
            id: Set(record.id.clone()),
            owner_id: Set(record.owner_id.clone()),
            file_name: Set(record.file_name.clone()),
            content_type: Set(record.content_type.clone()),
            size_bytes: Set(record.size),
            is_public: Set(record.is_public),
            moderation_status: Set(record.moderation_status.as_str().to_string()),
            uploaded_at: Set(format_timestamp(record.upload_date)),
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert file record")?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let model = files::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query file by ID")?;

        Ok(model.map(FileRecord::from))
    }

    /// Sets `is_public` and resets moderation to PENDING in one statement.
    /// Returns `false` if no row matched.
    pub async fn set_visibility(&self, id: &str, is_public: bool) -> Result<bool> {
        let result = files::Entity::update_many()
            .col_expr(files::Column::IsPublic, Expr::value(is_public))
            .col_expr(
                files::Column::ModerationStatus,
                Expr::value(ModerationStatus::Pending.as_str()),
            )
            .filter(files::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update file visibility")?;

        Ok(result.rows_affected > 0)
    }

    /// Sets the moderation status without touching `is_public`.
    pub async fn set_moderation(&self, id: &str, status: ModerationStatus) -> Result<bool> {
        let result = files::Entity::update_many()
            .col_expr(files::Column::ModerationStatus, Expr::value(status.as_str()))
            .filter(files::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update moderation status")?;

        Ok(result.rows_affected > 0)
    }

    /// Public and approved files, newest first.
    pub async fn list_public(&self, limit: u64, offset: u64) -> Result<Vec<FileRecord>> {
        let models = files::Entity::find()
            .filter(files::Column::IsPublic.eq(true))
            .filter(files::Column::ModerationStatus.eq(ModerationStatus::Approved.as_str()))
            .order_by_desc(files::Column::UploadedAt)
            .order_by_asc(files::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await
            .context("Failed to list public files")?;

        Ok(models.into_iter().map(FileRecord::from).collect())
    }

    pub async fn count_public(&self) -> Result<u64> {
        files::Entity::find()
            .filter(files::Column::IsPublic.eq(true))
            .filter(files::Column::ModerationStatus.eq(ModerationStatus::Approved.as_str()))
            .count(&self.conn)
            .await
            .context("Failed to count public files")
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>> {
        let models = files::Entity::find()
            .filter(files::Column::OwnerId.eq(owner_id))
            .order_by_desc(files::Column::UploadedAt)
            .all(&self.conn)
            .await
            .context("Failed to list files by owner")?;

        Ok(models.into_iter().map(FileRecord::from).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<FileRecord>> {
        let models = files::Entity::find()
            .order_by_desc(files::Column::UploadedAt)
            .all(&self.conn)
            .await
            .context("Failed to list files")?;

        Ok(models.into_iter().map(FileRecord::from).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = files::Entity::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete file record")?;

        Ok(result.rows_affected > 0)
    }
}

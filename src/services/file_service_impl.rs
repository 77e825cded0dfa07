//! `SeaORM` implementation of the `FileService` trait.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::constants::limits::MAX_PAGE_SIZE;
use crate::db::Store;
use crate::models::{FileRecord, ModerationStatus, Permission, permissions_for_roles};
use crate::services::file_service::{FileError, FilePage, FileService, NewUpload};
use crate::services::permissions::PermissionResolver;
use crate::services::token::Principal;
use crate::services::validation::validate_file_name;

pub struct SeaOrmFileService {
    store: Store,
    permissions: PermissionResolver,
}

impl SeaOrmFileService {
    #[must_use]
    pub const fn new(store: Store, permissions: PermissionResolver) -> Self {
        Self { store, permissions }
    }

    async fn load(&self, file_id: &str) -> Result<FileRecord, FileError> {
        self.store
            .get_file(file_id)
            .await?
            .ok_or_else(|| FileError::NotFound(file_id.to_string()))
    }

    /// Owner, or an administrator according to the store.
    async fn may_manage(&self, file: &FileRecord, actor: &Principal) -> Result<bool, FileError> {
        if file.is_owned_by(&actor.user_id) {
            return Ok(true);
        }
        Ok(self.permissions.is_admin(&actor.user_id).await?)
    }
}

#[async_trait]
impl FileService for SeaOrmFileService {
    async fn register_upload(
        &self,
        actor: &Principal,
        upload: NewUpload,
    ) -> Result<FileRecord, FileError> {
        if !permissions_for_roles(&actor.roles).contains(&Permission::UploadFiles) {
            return Err(FileError::Forbidden(
                "You do not have permission to upload files".to_string(),
            ));
        }
        validate_file_name(&upload.file_name).map_err(FileError::Validation)?;
        if upload.size < 0 {
            return Err(FileError::Validation("File size cannot be negative".to_string()));
        }

        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: Some(actor.user_id.clone()),
            file_name: upload.file_name,
            content_type: upload.content_type,
            size: upload.size,
            is_public: false,
            moderation_status: ModerationStatus::Pending,
            upload_date: Utc::now(),
        };
        self.store.insert_file(&record).await?;

        info!(file_id = %record.id, user_id = %actor.user_id, size = record.size, "File registered");
        Ok(record)
    }

    async fn set_visibility(
        &self,
        file_id: &str,
        make_public: bool,
        actor: &Principal,
    ) -> Result<FileRecord, FileError> {
        let file = self.load(file_id).await?;

        if !self.may_manage(&file, actor).await? {
            warn!(file_id = %file_id, user_id = %actor.user_id, "Visibility change denied");
            return Err(FileError::Forbidden(
                "You do not have permission to change this file's visibility".to_string(),
            ));
        }

        if !self.store.set_file_visibility(file_id, make_public).await? {
            return Err(FileError::NotFound(file_id.to_string()));
        }

        info!(
            file_id = %file_id,
            user_id = %actor.user_id,
            is_public = make_public,
            "File visibility changed, awaiting moderation"
        );
        self.load(file_id).await
    }

    async fn moderate(
        &self,
        file_id: &str,
        status: &str,
        actor: &Principal,
    ) -> Result<FileRecord, FileError> {
        if !self
            .permissions
            .has_permission(&actor.user_id, Permission::ModerateFiles)
            .await?
        {
            warn!(file_id = %file_id, user_id = %actor.user_id, "Moderation denied");
            return Err(FileError::Forbidden("Admin access required".to_string()));
        }

        let status: ModerationStatus = status.trim().parse().map_err(FileError::Validation)?;

        if !self.store.set_file_moderation(file_id, status).await? {
            return Err(FileError::NotFound(file_id.to_string()));
        }

        info!(file_id = %file_id, user_id = %actor.user_id, %status, "File moderated");
        self.load(file_id).await
    }

    async fn list_public(&self, page: u64, page_size: u64) -> Result<FilePage, FileError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let files = self.store.list_public_files(page_size, offset).await?;
        let total = self.store.count_public_files().await?;

        Ok(FilePage {
            files,
            page,
            page_size,
            total,
        })
    }

    async fn list_for(&self, actor: &Principal) -> Result<Vec<FileRecord>, FileError> {
        if self.permissions.is_admin(&actor.user_id).await? {
            return Ok(self.store.list_all_files().await?);
        }
        Ok(self.store.list_files_by_owner(&actor.user_id).await?)
    }

    async fn get(&self, file_id: &str, actor: Option<&Principal>) -> Result<FileRecord, FileError> {
        let file = self.load(file_id).await?;

        if file.is_publicly_listed() {
            return Ok(file);
        }
        if let Some(actor) = actor
            && self.may_manage(&file, actor).await?
        {
            return Ok(file);
        }

        // Private files are indistinguishable from missing ones.
        Err(FileError::NotFound(file_id.to_string()))
    }

    async fn delete(&self, file_id: &str, actor: &Principal) -> Result<(), FileError> {
        let file = self.load(file_id).await?;

        if !self.may_manage(&file, actor).await? {
            return Err(FileError::Forbidden(
                "You do not have permission to delete this file".to_string(),
            ));
        }

        if !self.store.delete_file(file_id).await? {
            return Err(FileError::NotFound(file_id.to_string()));
        }

        info!(file_id = %file_id, user_id = %actor.user_id, "File deleted");
        Ok(())
    }
}

//! Domain service for file metadata and the visibility/moderation state
//! machine.
//!
//! A file's public state is the pair `(is_public, moderation_status)`. Any
//! visibility change sends the file back to PENDING; only administrators
//! move it out of PENDING. A file is publicly listed iff it is public and
//! APPROVED.

use serde::Serialize;
use thiserror::Error;

use crate::models::FileRecord;
use crate::services::token::Principal;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("File {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for FileError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for FileError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Metadata for bytes already accepted by the storage collaborator.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

#[async_trait::async_trait]
pub trait FileService: Send + Sync {
    /// Records a private, PENDING file owned by `actor`.
    async fn register_upload(
        &self,
        actor: &Principal,
        upload: NewUpload,
    ) -> Result<FileRecord, FileError>;

    /// Sets visibility and unconditionally resets moderation to PENDING.
    ///
    /// # Errors
    ///
    /// [`FileError::NotFound`] if the file does not exist,
    /// [`FileError::Forbidden`] unless `actor` owns it or is an administrator.
    async fn set_visibility(
        &self,
        file_id: &str,
        make_public: bool,
        actor: &Principal,
    ) -> Result<FileRecord, FileError>;

    /// Sets the moderation status without touching visibility.
    ///
    /// # Errors
    ///
    /// [`FileError::Forbidden`] for non-administrators,
    /// [`FileError::Validation`] for an unknown status,
    /// [`FileError::NotFound`] for a missing file.
    async fn moderate(
        &self,
        file_id: &str,
        status: &str,
        actor: &Principal,
    ) -> Result<FileRecord, FileError>;

    /// Public and approved files, newest first. `page` starts at 1.
    async fn list_public(&self, page: u64, page_size: u64) -> Result<FilePage, FileError>;

    /// The actor's own files; every file for administrators.
    async fn list_for(&self, actor: &Principal) -> Result<Vec<FileRecord>, FileError>;

    /// Owner and administrators always see the file; anyone else only when it
    /// is publicly listed.
    async fn get(&self, file_id: &str, actor: Option<&Principal>) -> Result<FileRecord, FileError>;

    /// Removes the metadata row. Owner or administrator only.
    async fn delete(&self, file_id: &str, actor: &Principal) -> Result<(), FileError>;
}

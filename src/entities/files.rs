use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Null for legacy uploads that predate ownership tracking.
    pub owner_id: Option<String>,

    pub file_name: String,

    pub content_type: String,

    pub size_bytes: i64,

    pub is_public: bool,

    /// "PENDING", "APPROVED" or "REJECTED"
    pub moderation_status: String,

    pub uploaded_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

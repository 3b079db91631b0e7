use sea_orm::entity::prelude::*;

/// One guarded execution. `record_key` is `scope:user:key`, with `-` for no user.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "idempotency_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub record_key: String,
    pub scope: String,
    pub idempotency_key: String,
    pub user_id: Option<Uuid>,
    pub request_hash: String,
    pub status: String,
    pub response: Option<Json>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

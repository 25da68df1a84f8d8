use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Append-only audit entry. Each row hashes its payload chained to the
/// previous row's hash, so tampering is detectable by rewalking the chain.
/// The user_* columns snapshot identity at change time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleChangeLog {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "employee")]
    pub old_role: String,
    #[schema(example = "sales_head")]
    pub new_role: String,
    pub changed_by: Option<Uuid>,
    pub user_name: String,
    pub user_email: String,
    pub user_department: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRoleChangeLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub old_role: String,
    pub new_role: String,
    pub changed_by: Option<Uuid>,
    pub user_name: String,
    pub user_email: String,
    pub user_department: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbRoleChangeLog> for RoleChangeLog {
    fn from(value: DbRoleChangeLog) -> Self {
        RoleChangeLog {
            id: value.id,
            user_id: value.user_id,
            old_role: value.old_role,
            new_role: value.new_role,
            changed_by: value.changed_by,
            user_name: value.user_name,
            user_email: value.user_email,
            user_department: value.user_department,
            ip: value.ip,
            user_agent: value.user_agent,
            prev_hash: value.prev_hash,
            hash: value.hash,
            created_at: value.created_at,
        }
    }
}

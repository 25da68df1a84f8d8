use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Always scoped to its recipient; there is no cross-user listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    #[schema(example = "important")]
    pub severity: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub severity: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbNotification> for Notification {
    fn from(value: DbNotification) -> Self {
        Notification {
            id: value.id,
            user_id: value.user_id,
            title: value.title,
            body: value.body,
            severity: value.severity,
            read: value.read,
            created_at: value.created_at,
        }
    }
}

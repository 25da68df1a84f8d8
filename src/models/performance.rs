use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Monthly scoring bucket. `total_score` is always
/// `task_points + late_login_penalty`; approved leaves are informational.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Performance {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = 3)]
    pub month: i64,
    #[schema(example = 2025)]
    pub year: i64,
    pub tasks_completed: i64,
    pub task_points: i64,
    pub late_logins: i64,
    pub late_login_penalty: i64,
    pub approved_leaves: i64,
    pub total_score: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPerformance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: i64,
    pub year: i64,
    pub tasks_completed: i64,
    pub task_points: i64,
    pub late_logins: i64,
    pub late_login_penalty: i64,
    pub approved_leaves: i64,
    pub total_score: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPerformance> for Performance {
    fn from(value: DbPerformance) -> Self {
        Performance {
            id: value.id,
            user_id: value.user_id,
            month: value.month,
            year: value.year,
            tasks_completed: value.tasks_completed,
            task_points: value.task_points,
            late_logins: value.late_logins,
            late_login_penalty: value.late_login_penalty,
            approved_leaves: value.approved_leaves,
            total_score: value.total_score,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecomputeRequest {
    pub user_id: Uuid,
    #[schema(example = 3)]
    pub month: u32,
    #[schema(example = 2025)]
    pub year: i32,
}

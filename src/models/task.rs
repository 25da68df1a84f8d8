use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

pub const TASK_STATUSES: [&str; 4] = ["pending", "in_progress", "review", "completed"];
pub const TASK_PRIORITIES: [&str; 3] = ["low", "medium", "high"];

/// Position of a status in the pending -> completed pipeline. None for
/// anything outside the known set.
pub fn status_rank(status: &str) -> Option<u8> {
    TASK_STATUSES.iter().position(|s| *s == status).map(|p| p as u8)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
    /// Snapshot of the assignee's department at creation time.
    pub department: Option<Department>,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(example = "medium")]
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Task {
    fn entity_type() -> &'static str { "task" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
    pub department: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        Ok(Task {
            id: value.id,
            title: value.title,
            description: value.description,
            assigned_to: value.assigned_to,
            assigned_by: value.assigned_by,
            department: value.department.as_deref().and_then(Department::parse),
            status: value.status,
            priority: value.priority,
            due_date: value.due_date,
            completed_at: value.completed_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskSubmission {
    pub id: Uuid,
    pub task_id: Uuid,
    pub file_name: String,
    pub size_bytes: i64,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTaskSubmission {
    pub id: Uuid,
    pub task_id: Uuid,
    pub file_name: String,
    pub stored_path: String,
    pub size_bytes: i64,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
}

impl From<DbTaskSubmission> for TaskSubmission {
    fn from(value: DbTaskSubmission) -> Self {
        TaskSubmission {
            id: value.id,
            task_id: value.task_id,
            file_name: value.file_name,
            size_bytes: value.size_bytes,
            submitted_by: value.submitted_by,
            submitted_at: value.submitted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    #[schema(example = "Prepare quarterly report")]
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Uuid,
    #[schema(example = "high")]
    pub priority: Option<String>,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(example = "in_progress")]
    pub status: Option<String>,
    pub priority: Option<String>,
    #[schema(format = DateTime, example = "2025-11-01T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

pub const REQUEST_TYPES: [&str; 3] = ["leave", "expense", "task"];
pub const REQUEST_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

/// Employee-initiated request. Status is terminal once it leaves `pending`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Request {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "leave")]
    pub request_type: String,
    pub title: String,
    pub description: Option<String>,
    /// Expense requests carry an amount.
    pub amount: Option<f64>,
    /// Leave requests carry the day being requested off.
    pub requested_date: Option<NaiveDate>,
    /// Snapshot of the creator's department, used for approval routing.
    pub department: Option<Department>,
    #[schema(example = "pending")]
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl crate::events::Loggable for Request {
    fn entity_type() -> &'static str { "request" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub request_type: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub requested_date: Option<NaiveDate>,
    pub department: Option<String>,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbRequest> for Request {
    type Error = AppError;

    fn try_from(value: DbRequest) -> Result<Self, Self::Error> {
        Ok(Request {
            id: value.id,
            user_id: value.user_id,
            request_type: value.request_type,
            title: value.title,
            description: value.description,
            amount: value.amount,
            requested_date: value.requested_date,
            department: value.department.as_deref().and_then(Department::parse),
            status: value.status,
            approved_by: value.approved_by,
            approved_at: value.approved_at,
            rejection_reason: value.rejection_reason,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestCreateRequest {
    #[schema(example = "leave")]
    pub request_type: String,
    #[schema(example = "Annual leave")]
    pub title: String,
    pub description: Option<String>,
    pub amount: Option<f64>,
    #[schema(example = "2025-04-14")]
    pub requested_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestRejectRequest {
    #[schema(example = "Budget exhausted for this quarter")]
    pub reason: String,
}

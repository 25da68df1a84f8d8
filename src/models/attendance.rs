use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const ATTENDANCE_STATUSES: [&str; 3] = ["present", "half_day", "leave"];

/// One row per user per calendar day, created by the first login of the day
/// (or by an approved leave request). Absence is the missing row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub login_time: Option<DateTime<Utc>>,
    pub logout_time: Option<DateTime<Utc>>,
    #[schema(example = "present")]
    pub status: String,
    pub late: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAttendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub login_time: Option<DateTime<Utc>>,
    pub logout_time: Option<DateTime<Utc>>,
    pub status: String,
    pub late: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbAttendance> for Attendance {
    fn from(value: DbAttendance) -> Self {
        Attendance {
            id: value.id,
            user_id: value.user_id,
            date: value.date,
            login_time: value.login_time,
            logout_time: value.logout_time,
            status: value.status,
            late: value.late,
            created_at: value.created_at,
        }
    }
}

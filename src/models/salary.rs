use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const SALARY_STATUSES: [&str; 2] = ["pending", "paid"];

/// One record per user per (month, year). `net_salary` is always derived
/// from the other three amounts at write time, never accepted from input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Salary {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = 3)]
    pub month: i64,
    #[schema(example = 2025)]
    pub year: i64,
    pub basic: f64,
    pub allowances: f64,
    pub deductions: f64,
    pub net_salary: f64,
    #[schema(example = "pending")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSalary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: i64,
    pub year: i64,
    pub basic: f64,
    pub allowances: f64,
    pub deductions: f64,
    pub net_salary: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSalary> for Salary {
    fn from(value: DbSalary) -> Self {
        Salary {
            id: value.id,
            user_id: value.user_id,
            month: value.month,
            year: value.year,
            basic: value.basic,
            allowances: value.allowances,
            deductions: value.deductions,
            net_salary: value.net_salary,
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SalaryCreateRequest {
    pub user_id: Uuid,
    #[schema(example = 3)]
    pub month: i64,
    #[schema(example = 2025)]
    pub year: i64,
    pub basic: f64,
    pub allowances: Option<f64>,
    pub deductions: Option<f64>,
    #[schema(example = "pending")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SalaryUpdateRequest {
    pub basic: Option<f64>,
    pub allowances: Option<f64>,
    pub deductions: Option<f64>,
    pub status: Option<String>,
}

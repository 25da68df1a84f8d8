use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;

use super::role::{Department, Role};

/// The authenticated caller, resolved from the users table on every request.
/// Role changes therefore bind at the next request, not at token issue time.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub department: Option<Department>,
}

impl Actor {
    pub async fn load(pool: &SqlitePool, user_id: Uuid) -> Result<Self, AppError> {
        let row = sqlx::query("SELECT role, department, active FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

        let active: bool = row.try_get("active")?;
        if !active {
            return Err(AppError::unauthorized("account is deactivated"));
        }

        let role_name: String = row.try_get("role")?;
        let role = Role::parse(&role_name)
            .ok_or_else(|| AppError::internal(format!("unknown role in users table: {role_name}")))?;

        let department: Option<String> = row.try_get("department")?;
        let department = department.as_deref().and_then(Department::parse);

        Ok(Self {
            id: user_id,
            role,
            department,
        })
    }

    pub fn as_target(&self) -> TargetRef {
        TargetRef {
            id: self.id,
            role: self.role.as_str().to_string(),
            department: self.department,
        }
    }
}

/// Identity snapshot of the record under decision. `role` stays a plain
/// string so rows carrying a name outside the lattice drop to level 0
/// instead of failing the request.
#[derive(Debug, Clone)]
pub struct TargetRef {
    pub id: Uuid,
    pub role: String,
    pub department: Option<Department>,
}

impl TargetRef {
    pub fn new(id: Uuid, role: impl Into<String>, department: Option<Department>) -> Self {
        Self {
            id,
            role: role.into(),
            department,
        }
    }
}

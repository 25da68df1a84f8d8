use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::authz::Actor;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::role_change_log::{DbRoleChangeLog, RoleChangeLog};

#[utoipa::path(
    get,
    path = "/role-logs",
    tag = "RoleLogs",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Role change audit trail, oldest first", body = [RoleChangeLog]),
        (status = 403, description = "Reserved for founder and co-founder")
    )
)]
pub async fn list_role_logs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<RoleChangeLog>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    if actor.role.level() < 3 {
        return Err(AppError::forbidden(
            "audit log is reserved for founder and co-founder",
        ));
    }

    // rowid order is insertion order, which is also hash-chain order
    let rows = sqlx::query_as::<_, DbRoleChangeLog>(
        "SELECT id, user_id, old_role, new_role, changed_by, user_name, user_email, \
         user_department, ip, user_agent, prev_hash, hash, created_at \
         FROM role_change_log ORDER BY rowid ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(RoleChangeLog::from).collect()))
}

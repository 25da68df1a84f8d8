use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{visibility, Actor};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::attendance::{Attendance, DbAttendance};
use crate::routes::auth::fetch_user_by_id;
use crate::utils::utc_today;

const ATTENDANCE_COLUMNS: &str =
    "id, user_id, date, login_time, logout_time, status, late, created_at";

#[utoipa::path(
    get,
    path = "/attendance",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Attendance rows visible to the caller", body = [Attendance]))
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Attendance>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) =
        visibility(&actor).sql_predicate("u.role", "u.department", "a.user_id");
    let sql = format!(
        "SELECT a.id, a.user_id, a.date, a.login_time, a.logout_time, a.status, a.late, \
         a.created_at FROM attendance a JOIN users u ON u.id = a.user_id \
         WHERE {predicate} ORDER BY a.date DESC, a.created_at DESC"
    );

    let mut query = sqlx::query_as::<_, DbAttendance>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Attendance::from).collect()))
}

#[utoipa::path(
    get,
    path = "/attendance/today",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Caller's attendance row for today", body = Attendance),
        (status = 404, description = "No login recorded today")
    )
)]
pub async fn today(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Attendance>> {
    let row = sqlx::query_as::<_, DbAttendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = ? AND date = ?"
    ))
    .bind(auth.user_id.to_string())
    .bind(utc_today())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("no attendance recorded today"))?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    get,
    path = "/attendance/{id}",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Attendance row id")),
    responses(
        (status = 200, description = "Attendance detail", body = Attendance),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Attendance>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let row = sqlx::query_as::<_, DbAttendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("attendance row not found"))?;

    if row.user_id != actor.id {
        let owner = fetch_user_by_id(&state.pool, row.user_id).await?;
        if !visibility(&actor).matches(&owner.target_ref()) {
            return Err(AppError::not_found("attendance row not found"));
        }
    }

    Ok(Json(row.into()))
}

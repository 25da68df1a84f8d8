use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::notification::{DbNotification, Notification};
use crate::routes::auth::MessageResponse;

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, body, severity, read, created_at";

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Caller's notifications, newest first", body = [Notification]))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Notification>>> {
    let rows = sqlx::query_as::<_, DbNotification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ? ORDER BY created_at DESC"
    ))
    .bind(auth.user_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Notification::from).collect()))
}

#[utoipa::path(
    put,
    path = "/notifications/read-all",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "All notifications marked read", body = MessageResponse))
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    let updated = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(auth.user_id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(Json(MessageResponse::new(format!(
        "{} notifications marked read",
        updated.rows_affected()
    ))))
}

#[utoipa::path(
    delete,
    path = "/notifications/read",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Read notifications removed", body = MessageResponse))
)]
pub async fn clear_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE user_id = ? AND read = 1")
        .bind(auth.user_id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(Json(MessageResponse::new(format!(
        "{} notifications removed",
        deleted.rows_affected()
    ))))
}

#[utoipa::path(
    put,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = Notification),
        (status = 404, description = "Not the caller's notification")
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(auth.user_id.to_string())
        .execute(&state.pool)
        .await?;

    let row = sqlx::query_as::<_, DbNotification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ? AND user_id = ?"
    ))
    .bind(id.to_string())
    .bind(auth.user_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("notification not found"))?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification removed", body = MessageResponse),
        (status = 404, description = "Not the caller's notification")
    )
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(auth.user_id.to_string())
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::not_found("notification not found"));
    }

    Ok(Json(MessageResponse::new("notification removed")))
}

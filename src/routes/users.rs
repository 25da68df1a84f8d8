use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{can_assign_role, can_mutate, visibility, Actor};
use crate::errors::{AppError, AppResult};
use crate::events::{emit_change, RequestContext};
use crate::jwt::AuthUser;
use crate::models::user::{DbUser, RoleChangeRequest, User, UserUpdateRequest};
use crate::routes::auth::{fetch_user_by_id, MessageResponse, USER_COLUMNS};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Users visible to the caller", body = [User]))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) = visibility(&actor).sql_predicate("role", "department", "id");
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE active = 1 AND {predicate} ORDER BY created_at ASC"
    );

    let mut query = sqlx::query_as::<_, DbUser>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    let users = rows
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = User),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let db_user = fetch_user_by_id(&state.pool, id).await?;

    // Records outside the caller's slice read as absent, not as forbidden.
    if db_user.id != actor.id && !visibility(&actor).matches(&db_user.target_ref()) {
        return Err(AppError::not_found("user not found"));
    }

    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 403, description = "No authority over this user"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let db_user = fetch_user_by_id(&state.pool, id).await?;

    if db_user.id != actor.id && !can_mutate(&actor, &db_user.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }

    if let Some(email) = payload.email.as_deref() {
        if email != db_user.email {
            let taken: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND id <> ?")
                    .bind(email)
                    .bind(db_user.id.to_string())
                    .fetch_one(&state.pool)
                    .await?;
            if taken > 0 {
                return Err(AppError::conflict("email already in use"));
            }
        }
    }

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email), updated_at = ? \
         WHERE id = ?",
    )
    .bind(payload.name.as_deref())
    .bind(payload.email.as_deref())
    .bind(utc_now())
    .bind(db_user.id.to_string())
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated", body = MessageResponse),
        (status = 403, description = "No authority over this user")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let db_user = fetch_user_by_id(&state.pool, id).await?;

    if !can_mutate(&actor, &db_user.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }

    // Deactivation, not removal. Audit rows keep pointing at a real user.
    sqlx::query("UPDATE users SET active = 0, updated_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(db_user.id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(Json(MessageResponse::new("user deactivated")))
}

#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleChangeRequest,
    responses(
        (status = 200, description = "Updated user; unchanged when the role is already held", body = User),
        (status = 403, description = "Role outside the caller's grant ceiling")
    )
)]
pub async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleChangeRequest>,
) -> AppResult<Json<User>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let db_user = fetch_user_by_id(&state.pool, id).await?;

    if !can_assign_role(&actor, &db_user.target_ref(), payload.role) {
        return Err(AppError::forbidden("cannot assign this role"));
    }
    // Old role equals new role: nothing to change, log or announce.
    if db_user.role == payload.role.as_str() {
        let user: User = db_user.try_into()?;
        return Ok(Json(user));
    }

    let old_user: User = db_user.clone().try_into()?;
    let department = payload
        .role
        .resolve_department(payload.department, old_user.department)?;

    sqlx::query("UPDATE users SET role = ?, department = ?, updated_at = ? WHERE id = ?")
        .bind(payload.role.as_str())
        .bind(department.map(|d| d.as_str()))
        .bind(utc_now())
        .bind(db_user.id.to_string())
        .execute(&state.pool)
        .await?;

    let user: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;

    emit_change(
        &state.events,
        "role_changed",
        Some(actor.id),
        &user,
        Some(&old_user),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}

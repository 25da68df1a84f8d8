use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{emit_change, RequestContext};
use crate::jwt::AuthUser;
use crate::models::attendance::DbAttendance;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::performance;
use crate::utils::{hash_password, utc_now, verify_password};

pub const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, department, active, created_at, updated_at";

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Role and department do not fit together"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let department = payload.role.resolve_department(payload.department, None)?;
    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, department, active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(payload.role.as_str())
    .bind(department.map(|d| d.as_str()))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.issue(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.active {
        return Err(AppError::unauthorized("account is deactivated"));
    }

    let token = state.jwt.issue(db_user.id)?;
    record_login_attendance(&state, &db_user).await?;

    let user: User = db_user.try_into()?;
    emit_change(
        &state.events,
        "logged_in",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    let now = utc_now();

    // First logout of the day wins; later calls are acknowledged but ignored.
    sqlx::query(
        "UPDATE attendance SET logout_time = ? WHERE user_id = ? AND date = ? AND logout_time IS NULL",
    )
    .bind(now)
    .bind(auth.user_id.to_string())
    .bind(now.date_naive())
    .execute(&state.pool)
    .await?;

    Ok(Json(MessageResponse::new("Logged out")))
}

/// First login of the day creates the attendance row and, when late, feeds
/// the scoring bucket. Repeat logins leave the row untouched.
async fn record_login_attendance(state: &AppState, db_user: &DbUser) -> AppResult<()> {
    let now = utc_now();
    let today = now.date_naive();
    let late = now.time() > state.scoring.late_login_threshold;
    let status = if now.time() > state.scoring.half_day_threshold {
        "half_day"
    } else {
        "present"
    };

    let existing = sqlx::query_as::<_, DbAttendance>(
        "SELECT id, user_id, date, login_time, logout_time, status, late, created_at \
         FROM attendance WHERE user_id = ? AND date = ?",
    )
    .bind(db_user.id.to_string())
    .bind(today)
    .fetch_optional(&state.pool)
    .await?;

    let first_login = match existing {
        None => {
            let inserted = sqlx::query(
                "INSERT INTO attendance (id, user_id, date, login_time, logout_time, status, late, created_at) \
                 VALUES (?, ?, ?, ?, NULL, ?, ?, ?) \
                 ON CONFLICT(user_id, date) DO NOTHING",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(db_user.id.to_string())
            .bind(today)
            .bind(now)
            .bind(status)
            .bind(late)
            .bind(now)
            .execute(&state.pool)
            .await?;
            inserted.rows_affected() == 1
        }
        // A leave row approved before the login keeps its leave status.
        Some(row) if row.login_time.is_none() => {
            let updated = sqlx::query(
                "UPDATE attendance SET login_time = ?, late = ?, \
                 status = CASE WHEN status = 'leave' THEN status ELSE ? END \
                 WHERE id = ? AND login_time IS NULL",
            )
            .bind(now)
            .bind(late)
            .bind(status)
            .bind(row.id.to_string())
            .execute(&state.pool)
            .await?;
            updated.rows_affected() == 1
        }
        Some(_) => false,
    };

    if first_login && late {
        performance::record_late_login(&state.pool, &state.scoring, db_user.id, now).await?;
    }

    Ok(())
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

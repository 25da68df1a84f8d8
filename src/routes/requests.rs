use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{visibility, Actor, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{emit_change, RequestContext};
use crate::jwt::AuthUser;
use crate::models::request::{
    DbRequest, Request, RequestCreateRequest, RequestRejectRequest, REQUEST_TYPES,
};
use crate::performance;
use crate::routes::auth::fetch_user_by_id;
use crate::utils::utc_now;

const REQUEST_COLUMNS: &str = "id, user_id, request_type, title, description, amount, \
     requested_date, department, status, approved_by, approved_at, rejection_reason, created_at";

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Requests visible to the caller", body = [Request]))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Request>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) =
        visibility(&actor).sql_predicate("u.role", "u.department", "r.user_id");
    let sql = format!(
        "SELECT r.id, r.user_id, r.request_type, r.title, r.description, r.amount, \
         r.requested_date, r.department, r.status, r.approved_by, r.approved_at, \
         r.rejection_reason, r.created_at \
         FROM requests r JOIN users u ON u.id = r.user_id \
         WHERE {predicate} ORDER BY r.created_at DESC"
    );

    let mut query = sqlx::query_as::<_, DbRequest>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    let requests = rows
        .into_iter()
        .map(Request::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(requests))
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    security(("bearerAuth" = [])),
    request_body = RequestCreateRequest,
    responses(
        (status = 201, description = "Request created", body = Request),
        (status = 403, description = "Only employees file requests")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RequestCreateRequest>,
) -> AppResult<(StatusCode, Json<Request>)> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    if actor.role != Role::Employee {
        return Err(AppError::forbidden("only employees file requests"));
    }
    if !REQUEST_TYPES.contains(&payload.request_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "request_type must be one of: {}",
            REQUEST_TYPES.join(", ")
        )));
    }
    match payload.request_type.as_str() {
        "leave" if payload.requested_date.is_none() => {
            return Err(AppError::bad_request("leave requests need a requested_date"));
        }
        "expense" if payload.amount.is_none() => {
            return Err(AppError::bad_request("expense requests need an amount"));
        }
        _ => {}
    }
    if let Some(amount) = payload.amount {
        if amount <= 0.0 {
            return Err(AppError::bad_request("amount must be positive"));
        }
    }

    let now = utc_now();
    let request_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO requests (id, user_id, request_type, title, description, amount, \
         requested_date, department, status, approved_by, approved_at, rejection_reason, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', NULL, NULL, NULL, ?)",
    )
    .bind(request_id.to_string())
    .bind(actor.id.to_string())
    .bind(&payload.request_type)
    .bind(&payload.title)
    .bind(payload.description.as_deref())
    .bind(payload.amount)
    .bind(payload.requested_date)
    .bind(actor.department.map(|d| d.as_str()))
    .bind(now)
    .execute(&state.pool)
    .await?;

    let request: Request = fetch_request(&state.pool, request_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request detail", body = Request),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Request>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_request(&state.pool, id).await?;

    if row.user_id != actor.id {
        let owner = fetch_user_by_id(&state.pool, row.user_id).await?;
        if !visibility(&actor).matches(&owner.target_ref()) {
            return Err(AppError::not_found("request not found"));
        }
    }

    Ok(Json(row.try_into()?))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request approved", body = Request),
        (status = 403, description = "Caller may not review this request"),
        (status = 409, description = "Request is no longer pending")
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Request>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_request(&state.pool, id).await?;

    ensure_reviewer(&actor, &row)?;
    ensure_pending(&row)?;

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE requests SET status = 'approved', approved_by = ?, approved_at = ? WHERE id = ?",
    )
    .bind(actor.id.to_string())
    .bind(now)
    .bind(row.id.to_string())
    .execute(&mut *tx)
    .await?;

    // An approved leave materializes as an attendance row for that day and
    // counts into the monthly bucket.
    if row.request_type == "leave" {
        if let Some(date) = row.requested_date {
            sqlx::query(
                "INSERT INTO attendance (id, user_id, date, login_time, logout_time, status, late, created_at) \
                 VALUES (?, ?, ?, NULL, NULL, 'leave', 0, ?) \
                 ON CONFLICT(user_id, date) DO UPDATE SET status = 'leave'",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(row.user_id.to_string())
            .bind(date)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        performance::record_approved_leave(&mut *tx, row.user_id, now).await?;
    }
    tx.commit().await?;

    let request: Request = fetch_request(&state.pool, id).await?.try_into()?;

    emit_change(
        &state.events,
        "approved",
        Some(actor.id),
        &request,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = RequestRejectRequest,
    responses(
        (status = 200, description = "Request rejected", body = Request),
        (status = 403, description = "Caller may not review this request"),
        (status = 409, description = "Request is no longer pending")
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequestRejectRequest>,
) -> AppResult<Json<Request>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_request(&state.pool, id).await?;

    ensure_reviewer(&actor, &row)?;
    ensure_pending(&row)?;

    if payload.reason.trim().is_empty() {
        return Err(AppError::bad_request("a rejection reason is required"));
    }

    sqlx::query(
        "UPDATE requests SET status = 'rejected', approved_by = ?, approved_at = ?, \
         rejection_reason = ? WHERE id = ?",
    )
    .bind(actor.id.to_string())
    .bind(utc_now())
    .bind(payload.reason.trim())
    .bind(row.id.to_string())
    .execute(&state.pool)
    .await?;

    let request: Request = fetch_request(&state.pool, id).await?.try_into()?;

    emit_change(
        &state.events,
        "rejected",
        Some(actor.id),
        &request,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(request))
}

/// Reviewers sit above employee level; heads only review requests filed
/// from their own department.
fn ensure_reviewer(actor: &Actor, request: &DbRequest) -> AppResult<()> {
    if actor.role.level() <= 1 {
        return Err(AppError::forbidden("caller may not review requests"));
    }
    if let Some(dept) = actor.role.bound_department() {
        if request.department.as_deref() != Some(dept.as_str()) {
            return Err(AppError::forbidden(
                "request belongs to another department",
            ));
        }
    }
    Ok(())
}

fn ensure_pending(request: &DbRequest) -> AppResult<()> {
    if request.status != "pending" {
        return Err(AppError::conflict(format!(
            "request is already {}",
            request.status
        )));
    }
    Ok(())
}

async fn fetch_request(pool: &SqlitePool, id: Uuid) -> AppResult<DbRequest> {
    sqlx::query_as::<_, DbRequest>(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("request not found"))
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{can_mutate, visibility, Actor};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::salary::{
    DbSalary, Salary, SalaryCreateRequest, SalaryUpdateRequest, SALARY_STATUSES,
};
use crate::routes::auth::{fetch_user_by_id, MessageResponse};
use crate::utils::utc_now;

const SALARY_COLUMNS: &str =
    "id, user_id, month, year, basic, allowances, deductions, net_salary, status, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/salaries",
    tag = "Salaries",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Salary records visible to the caller", body = [Salary]))
)]
pub async fn list_salaries(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Salary>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) =
        visibility(&actor).sql_predicate("u.role", "u.department", "s.user_id");
    let sql = format!(
        "SELECT s.id, s.user_id, s.month, s.year, s.basic, s.allowances, s.deductions, \
         s.net_salary, s.status, s.created_at, s.updated_at \
         FROM salaries s JOIN users u ON u.id = s.user_id \
         WHERE {predicate} ORDER BY s.year DESC, s.month DESC"
    );

    let mut query = sqlx::query_as::<_, DbSalary>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Salary::from).collect()))
}

#[utoipa::path(
    post,
    path = "/salaries",
    tag = "Salaries",
    security(("bearerAuth" = [])),
    request_body = SalaryCreateRequest,
    responses(
        (status = 201, description = "Salary record created", body = Salary),
        (status = 403, description = "No authority over this user"),
        (status = 409, description = "Record already exists for this month")
    )
)]
pub async fn create_salary(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SalaryCreateRequest>,
) -> AppResult<(StatusCode, Json<Salary>)> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let owner = fetch_user_by_id(&state.pool, payload.user_id).await?;

    if !can_mutate(&actor, &owner.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }
    ensure_month(payload.month)?;

    let status = payload.status.as_deref().unwrap_or("pending");
    ensure_status(status)?;

    let allowances = payload.allowances.unwrap_or(0.0);
    let deductions = payload.deductions.unwrap_or(0.0);
    let net_salary = payload.basic + allowances - deductions;
    let now = utc_now();
    let salary_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO salaries (id, user_id, month, year, basic, allowances, deductions, \
         net_salary, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(salary_id.to_string())
    .bind(owner.id.to_string())
    .bind(payload.month)
    .bind(payload.year)
    .bind(payload.basic)
    .bind(allowances)
    .bind(deductions)
    .bind(net_salary)
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let salary: Salary = fetch_salary(&state.pool, salary_id).await?.into();
    Ok((StatusCode::CREATED, Json(salary)))
}

#[utoipa::path(
    get,
    path = "/salaries/{id}",
    tag = "Salaries",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Salary record id")),
    responses(
        (status = 200, description = "Salary detail", body = Salary),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_salary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Salary>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_salary(&state.pool, id).await?;

    if row.user_id != actor.id {
        let owner = fetch_user_by_id(&state.pool, row.user_id).await?;
        if !visibility(&actor).matches(&owner.target_ref()) {
            return Err(AppError::not_found("salary record not found"));
        }
    }

    Ok(Json(row.into()))
}

#[utoipa::path(
    put,
    path = "/salaries/{id}",
    tag = "Salaries",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Salary record id")),
    request_body = SalaryUpdateRequest,
    responses(
        (status = 200, description = "Updated salary", body = Salary),
        (status = 403, description = "No authority over this user")
    )
)]
pub async fn update_salary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SalaryUpdateRequest>,
) -> AppResult<Json<Salary>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_salary(&state.pool, id).await?;
    let owner = fetch_user_by_id(&state.pool, row.user_id).await?;

    if !can_mutate(&actor, &owner.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }

    let status = match payload.status.as_deref() {
        Some(status) => {
            ensure_status(status)?;
            status
        }
        None => row.status.as_str(),
    };

    // net_salary is derived, never taken from input
    let basic = payload.basic.unwrap_or(row.basic);
    let allowances = payload.allowances.unwrap_or(row.allowances);
    let deductions = payload.deductions.unwrap_or(row.deductions);
    let net_salary = basic + allowances - deductions;

    sqlx::query(
        "UPDATE salaries SET basic = ?, allowances = ?, deductions = ?, net_salary = ?, \
         status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(basic)
    .bind(allowances)
    .bind(deductions)
    .bind(net_salary)
    .bind(status)
    .bind(utc_now())
    .bind(row.id.to_string())
    .execute(&state.pool)
    .await?;

    let salary: Salary = fetch_salary(&state.pool, id).await?.into();
    Ok(Json(salary))
}

#[utoipa::path(
    delete,
    path = "/salaries/{id}",
    tag = "Salaries",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Salary record id")),
    responses(
        (status = 200, description = "Salary record deleted", body = MessageResponse),
        (status = 403, description = "No authority over this user")
    )
)]
pub async fn delete_salary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let row = fetch_salary(&state.pool, id).await?;
    let owner = fetch_user_by_id(&state.pool, row.user_id).await?;

    if !can_mutate(&actor, &owner.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }

    sqlx::query("DELETE FROM salaries WHERE id = ?")
        .bind(row.id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(Json(MessageResponse::new("salary record deleted")))
}

async fn fetch_salary(pool: &SqlitePool, id: Uuid) -> AppResult<DbSalary> {
    sqlx::query_as::<_, DbSalary>(&format!("SELECT {SALARY_COLUMNS} FROM salaries WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("salary record not found"))
}

fn ensure_month(month: i64) -> AppResult<()> {
    if !(1..=12).contains(&month) {
        return Err(AppError::bad_request("month must be between 1 and 12"));
    }
    Ok(())
}

fn ensure_status(status: &str) -> AppResult<()> {
    if !SALARY_STATUSES.contains(&status) {
        return Err(AppError::bad_request(format!(
            "status must be one of: {}",
            SALARY_STATUSES.join(", ")
        )));
    }
    Ok(())
}

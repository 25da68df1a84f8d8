use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{can_mutate, visibility, Actor};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::performance::{DbPerformance, Performance, RecomputeRequest};
use crate::performance as scoring;
use crate::routes::auth::fetch_user_by_id;

const PERFORMANCE_COLUMNS: &str = "id, user_id, month, year, tasks_completed, task_points, \
     late_logins, late_login_penalty, approved_leaves, total_score, updated_at";

#[utoipa::path(
    get,
    path = "/performance",
    tag = "Performance",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Score buckets visible to the caller", body = [Performance]))
)]
pub async fn list_performance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Performance>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) =
        visibility(&actor).sql_predicate("u.role", "u.department", "p.user_id");
    let sql = format!(
        "SELECT p.id, p.user_id, p.month, p.year, p.tasks_completed, p.task_points, \
         p.late_logins, p.late_login_penalty, p.approved_leaves, p.total_score, p.updated_at \
         FROM performance p JOIN users u ON u.id = p.user_id \
         WHERE {predicate} ORDER BY p.year DESC, p.month DESC"
    );

    let mut query = sqlx::query_as::<_, DbPerformance>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    Ok(Json(rows.into_iter().map(Performance::from).collect()))
}

#[utoipa::path(
    post,
    path = "/performance/recompute",
    tag = "Performance",
    security(("bearerAuth" = [])),
    request_body = RecomputeRequest,
    responses(
        (status = 200, description = "Bucket rebuilt from source rows", body = [Performance]),
        (status = 403, description = "No authority over this user")
    )
)]
pub async fn recompute(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RecomputeRequest>,
) -> AppResult<Json<Vec<Performance>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let owner = fetch_user_by_id(&state.pool, payload.user_id).await?;

    if !can_mutate(&actor, &owner.target_ref()) {
        return Err(AppError::forbidden("no authority over this user"));
    }
    if !(1..=12).contains(&payload.month) {
        return Err(AppError::bad_request("month must be between 1 and 12"));
    }

    scoring::recompute_bucket(
        &state.pool,
        &state.scoring,
        payload.user_id,
        payload.month,
        payload.year,
    )
    .await?;

    let rows = fetch_user_buckets(&state.pool, payload.user_id).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/performance/{user_id}",
    tag = "Performance",
    security(("bearerAuth" = [])),
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Score buckets for one user", body = [Performance]),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_performance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Performance>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    if user_id != actor.id {
        let owner = fetch_user_by_id(&state.pool, user_id).await?;
        if !visibility(&actor).matches(&owner.target_ref()) {
            return Err(AppError::not_found("user not found"));
        }
    }

    let rows = fetch_user_buckets(&state.pool, user_id).await?;
    Ok(Json(rows))
}

async fn fetch_user_buckets(
    pool: &sqlx::SqlitePool,
    user_id: Uuid,
) -> AppResult<Vec<Performance>> {
    let rows = sqlx::query_as::<_, DbPerformance>(&format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM performance WHERE user_id = ? \
         ORDER BY year DESC, month DESC"
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Performance::from).collect())
}

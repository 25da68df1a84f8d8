use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{can_mutate, visibility, Actor, TargetRef};
use crate::errors::{AppError, AppResult};
use crate::events::{emit_change, RequestContext};
use crate::jwt::AuthUser;
use crate::models::task::{
    status_rank, DbTask, DbTaskSubmission, Task, TaskCreateRequest, TaskSubmission,
    TaskUpdateRequest, TASK_PRIORITIES,
};
use crate::performance;
use crate::routes::auth::{fetch_user_by_id, MessageResponse};
use crate::storage::{self, StoredFile};
use crate::utils::utc_now;

const TASK_COLUMNS: &str = "id, title, description, assigned_to, assigned_by, department, \
     status, priority, due_date, completed_at, created_at, updated_at";

const SUBMISSION_COLUMNS: &str =
    "id, task_id, file_name, stored_path, size_bytes, submitted_by, submitted_at";

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Tasks whose assignee is visible to the caller", body = [Task]))
)]
pub async fn list_tasks(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Task>>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;

    let (predicate, binds) =
        visibility(&actor).sql_predicate("u.role", "u.department", "t.assigned_to");
    let sql = format!(
        "SELECT t.id, t.title, t.description, t.assigned_to, t.assigned_by, t.department, \
         t.status, t.priority, t.due_date, t.completed_at, t.created_at, t.updated_at \
         FROM tasks t JOIN users u ON u.id = t.assigned_to \
         WHERE {predicate} ORDER BY t.created_at DESC"
    );

    let mut query = sqlx::query_as::<_, DbTask>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.pool).await?;

    let tasks = rows
        .into_iter()
        .map(Task::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 403, description = "No authority over the assignee")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let assignee = fetch_user_by_id(&state.pool, payload.assigned_to).await?;

    if !assignee.active {
        return Err(AppError::bad_request("cannot assign a task to a deactivated user"));
    }
    if !can_mutate(&actor, &assignee.target_ref()) {
        return Err(AppError::forbidden("no authority over the assignee"));
    }

    let priority = payload.priority.as_deref().unwrap_or("medium");
    ensure_priority(priority)?;

    let now = utc_now();
    let task_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO tasks (id, title, description, assigned_to, assigned_by, department, \
         status, priority, due_date, completed_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, NULL, ?, ?)",
    )
    .bind(task_id.to_string())
    .bind(&payload.title)
    .bind(payload.description.as_deref())
    .bind(assignee.id.to_string())
    .bind(actor.id.to_string())
    .bind(assignee.department.as_deref())
    .bind(priority)
    .bind(payload.due_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let task: Task = fetch_task(&state.pool, task_id).await?.try_into()?;

    emit_change(
        &state.events,
        "assigned",
        Some(actor.id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail", body = Task),
        (status = 404, description = "Unknown or not visible")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Task>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_visible_task(&state.pool, &actor, id).await?;
    Ok(Json(task.try_into()?))
}

#[utoipa::path(
    put,
    path = "/tasks/{id}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 403, description = "Caller may not edit this task"),
        (status = 409, description = "Task is completed")
    )
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_task(&state.pool, id).await?;
    let assignee_target = assignee_target(&state.pool, task.assigned_to).await?;

    let is_assignee = actor.id == task.assigned_to;
    let manages = can_mutate(&actor, &assignee_target);
    if !is_assignee && !manages {
        return Err(AppError::forbidden("caller may not edit this task"));
    }
    if task.status == "completed" {
        return Err(AppError::conflict("task is completed"));
    }

    if is_assignee && !manages {
        // Assignees move their own task through the pipeline, nothing else.
        if payload.title.is_some()
            || payload.description.is_some()
            || payload.priority.is_some()
            || payload.due_date.is_some()
        {
            return Err(AppError::forbidden("assignees may only update task status"));
        }
        let status = payload
            .status
            .as_deref()
            .ok_or_else(|| AppError::bad_request("status is required"))?;
        let new_rank =
            status_rank(status).ok_or_else(|| AppError::bad_request("unknown task status"))?;
        let current_rank = status_rank(&task.status).unwrap_or(0);
        if new_rank <= current_rank {
            return Err(AppError::bad_request("status can only move forward"));
        }
    } else {
        if let Some(status) = payload.status.as_deref() {
            if status_rank(status).is_none() {
                return Err(AppError::bad_request("unknown task status"));
            }
        }
        if let Some(priority) = payload.priority.as_deref() {
            ensure_priority(priority)?;
        }
    }

    let now = utc_now();
    let completing = matches!(payload.status.as_deref(), Some("completed"));

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "UPDATE tasks SET title = COALESCE(?, title), description = COALESCE(?, description), \
         status = COALESCE(?, status), priority = COALESCE(?, priority), \
         due_date = COALESCE(?, due_date), \
         completed_at = CASE WHEN ? THEN ? ELSE completed_at END, updated_at = ? \
         WHERE id = ?",
    )
    .bind(payload.title.as_deref())
    .bind(payload.description.as_deref())
    .bind(payload.status.as_deref())
    .bind(payload.priority.as_deref())
    .bind(payload.due_date)
    .bind(completing)
    .bind(now)
    .bind(now)
    .bind(task.id.to_string())
    .execute(&mut *tx)
    .await?;

    if completing {
        performance::record_task_completion(&mut *tx, &state.scoring, task.assigned_to, now)
            .await?;
    }
    tx.commit().await?;

    let task: Task = fetch_task(&state.pool, id).await?.try_into()?;
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task deleted", body = MessageResponse),
        (status = 403, description = "No authority over the assignee")
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_task(&state.pool, id).await?;
    let target = assignee_target(&state.pool, task.assigned_to).await?;

    if !can_mutate(&actor, &target) {
        return Err(AppError::forbidden("no authority over the assignee"));
    }

    let stored_path: Option<String> =
        sqlx::query_scalar("SELECT stored_path FROM task_submissions WHERE task_id = ?")
            .bind(task.id.to_string())
            .fetch_optional(&state.pool)
            .await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM task_submissions WHERE task_id = ?")
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if let Some(path) = stored_path {
        storage::remove_file(std::path::Path::new(&path)).await;
    }

    Ok(Json(MessageResponse::new("task deleted")))
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/submit",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Submission stored, task completed", body = TaskSubmission),
        (status = 403, description = "Only the assignee may submit"),
        (status = 409, description = "Task already has a submission"),
        (status = 413, description = "File too large")
    )
)]
pub async fn submit_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<TaskSubmission>)> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_task(&state.pool, id).await?;

    if actor.id != task.assigned_to {
        return Err(AppError::forbidden("only the assignee may submit"));
    }
    if task.status == "completed" {
        return Err(AppError::conflict("task is completed"));
    }

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM task_submissions WHERE task_id = ?")
        .bind(task.id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if existing > 0 {
        return Err(AppError::conflict("task already has a submission"));
    }

    let (file_name, data) = read_upload(&mut multipart).await?;
    let stored = storage::save_submission(&state.storage, task.id, &file_name, &data).await?;

    // The file is on disk before the transaction starts; any failure below
    // must remove it again.
    match persist_submission(&state, &task, &stored, actor.id).await {
        Ok(submission) => Ok((StatusCode::CREATED, Json(submission))),
        Err(err) => {
            storage::remove_file(&stored.stored_path).await;
            Err(err)
        }
    }
}

#[utoipa::path(
    get,
    path = "/tasks/{id}/submission",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Submission metadata", body = TaskSubmission),
        (status = 404, description = "No submission")
    )
)]
pub async fn get_submission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TaskSubmission>> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_visible_task(&state.pool, &actor, id).await?;
    let submission = fetch_submission(&state.pool, task.id).await?;
    Ok(Json(submission.into()))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}/submission/file",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Submission file body"),
        (status = 404, description = "No submission")
    )
)]
pub async fn download_submission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let actor = Actor::load(&state.pool, auth.user_id).await?;
    let task = fetch_visible_task(&state.pool, &actor, id).await?;
    let submission = fetch_submission(&state.pool, task.id).await?;

    let bytes = storage::read_file(std::path::Path::new(&submission.stored_path)).await?;
    let file_name = submission.file_name.replace('"', "");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    ))
}

async fn read_upload(multipart: &mut Multipart) -> AppResult<(String, axum::body::Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if let Some(file_name) = field.file_name().map(ToString::to_string) {
            let data = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(format!("failed to read upload: {err}")))?;
            return Ok((file_name, data));
        }
    }
    Err(AppError::bad_request("multipart body must contain a file field"))
}

async fn persist_submission(
    state: &AppState,
    task: &DbTask,
    stored: &StoredFile,
    submitted_by: Uuid,
) -> AppResult<TaskSubmission> {
    let now = utc_now();
    let submission_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO task_submissions (id, task_id, file_name, stored_path, size_bytes, \
         submitted_by, submitted_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(submission_id.to_string())
    .bind(task.id.to_string())
    .bind(&stored.file_name)
    .bind(stored.stored_path.to_string_lossy().as_ref())
    .bind(stored.size_bytes)
    .bind(submitted_by.to_string())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE tasks SET status = 'completed', completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await?;

    performance::record_task_completion(&mut *tx, &state.scoring, task.assigned_to, now).await?;
    tx.commit().await?;

    let submission = fetch_submission(&state.pool, task.id).await?;
    Ok(submission.into())
}

async fn fetch_task(pool: &SqlitePool, task_id: Uuid) -> AppResult<DbTask> {
    sqlx::query_as::<_, DbTask>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))
}

/// Point read under the same filter the list uses. A task whose assignee is
/// outside the caller's slice reads as absent.
async fn fetch_visible_task(pool: &SqlitePool, actor: &Actor, task_id: Uuid) -> AppResult<DbTask> {
    let task = fetch_task(pool, task_id).await?;
    let target = assignee_target(pool, task.assigned_to).await?;

    if actor.id != task.assigned_to
        && actor.id != task.assigned_by
        && !visibility(actor).matches(&target)
    {
        return Err(AppError::not_found("task not found"));
    }

    Ok(task)
}

async fn assignee_target(pool: &SqlitePool, user_id: Uuid) -> AppResult<TargetRef> {
    let user = fetch_user_by_id(pool, user_id).await?;
    Ok(user.target_ref())
}

async fn fetch_submission(pool: &SqlitePool, task_id: Uuid) -> AppResult<DbTaskSubmission> {
    sqlx::query_as::<_, DbTaskSubmission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM task_submissions WHERE task_id = ?"
    ))
    .bind(task_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("no submission for this task"))
}

fn ensure_priority(priority: &str) -> AppResult<()> {
    if !TASK_PRIORITIES.contains(&priority) {
        return Err(AppError::bad_request(format!(
            "priority must be one of: {}",
            TASK_PRIORITIES.join(", ")
        )));
    }
    Ok(())
}

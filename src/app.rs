use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ScoringConfig, StorageConfig};
use crate::errors::AppError;
use crate::events::EventBus;
use crate::jwt::JwtConfig;
use crate::routes::{
    attendance, auth, health, notifications, performance, requests, role_logs, salary, tasks,
    users,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub events: EventBus,
    pub scoring: Arc<ScoringConfig>,
    pub storage: Arc<StorageConfig>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtConfig,
        events: EventBus,
        scoring: ScoringConfig,
        storage: StorageConfig,
    ) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            events,
            scoring: Arc::new(scoring),
            storage: Arc::new(storage),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let scoring = ScoringConfig::from_env()?;
    let storage = StorageConfig::from_env()?;

    let events = EventBus::new();
    crate::events::spawn_side_effect_listener(pool.clone(), events.subscribe());

    let max_upload = storage.max_upload_bytes;
    let state = AppState::new(pool, jwt_config, events, scoring, storage);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user))
        .route("/:id/role", put(users::change_role));

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/", post(tasks::create_task))
        .route("/:id", get(tasks::get_task))
        .route("/:id", put(tasks::update_task))
        .route("/:id", delete(tasks::delete_task))
        .route("/:id/submit", post(tasks::submit_task))
        .route("/:id/submission", get(tasks::get_submission))
        .route("/:id/submission/file", get(tasks::download_submission))
        // multipart submissions carry the file body, everything else is small JSON
        .layer(DefaultBodyLimit::max(max_upload + 64 * 1024));

    let attendance_routes = Router::new()
        .route("/", get(attendance::list_attendance))
        .route("/today", get(attendance::today))
        .route("/:id", get(attendance::get_attendance));

    let salary_routes = Router::new()
        .route("/", get(salary::list_salaries))
        .route("/", post(salary::create_salary))
        .route("/:id", get(salary::get_salary))
        .route("/:id", put(salary::update_salary))
        .route("/:id", delete(salary::delete_salary));

    let request_routes = Router::new()
        .route("/", get(requests::list_requests))
        .route("/", post(requests::create_request))
        .route("/:id", get(requests::get_request))
        .route("/:id/approve", post(requests::approve_request))
        .route("/:id/reject", post(requests::reject_request));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/read-all", put(notifications::mark_all_read))
        .route("/read", delete(notifications::clear_read))
        .route("/:id/read", put(notifications::mark_read))
        .route("/:id", delete(notifications::delete_notification));

    let performance_routes = Router::new()
        .route("/", get(performance::list_performance))
        .route("/recompute", post(performance::recompute))
        .route("/:user_id", get(performance::get_performance));

    let role_log_routes = Router::new().route("/", get(role_logs::list_role_logs));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/tasks", task_routes)
        .nest("/attendance", attendance_routes)
        .nest("/salaries", salary_routes)
        .nest("/requests", request_routes)
        .nest("/notifications", notification_routes)
        .nest("/performance", performance_routes)
        .nest("/role-logs", role_log_routes)
        .merge(crate::docs::swagger_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

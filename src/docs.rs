use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{Department, Role};
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::users::list_users,
		routes::users::get_user,
		routes::users::update_user,
		routes::users::delete_user,
		routes::users::change_role,
		routes::tasks::list_tasks,
		routes::tasks::create_task,
		routes::tasks::get_task,
		routes::tasks::update_task,
		routes::tasks::delete_task,
		routes::tasks::submit_task,
		routes::tasks::get_submission,
		routes::tasks::download_submission,
		routes::attendance::list_attendance,
		routes::attendance::today,
		routes::attendance::get_attendance,
		routes::salary::list_salaries,
		routes::salary::create_salary,
		routes::salary::get_salary,
		routes::salary::update_salary,
		routes::salary::delete_salary,
		routes::requests::list_requests,
		routes::requests::create_request,
		routes::requests::get_request,
		routes::requests::approve_request,
		routes::requests::reject_request,
		routes::notifications::list_notifications,
		routes::notifications::mark_all_read,
		routes::notifications::clear_read,
		routes::notifications::mark_read,
		routes::notifications::delete_notification,
		routes::performance::list_performance,
		routes::performance::recompute,
		routes::performance::get_performance,
		routes::role_logs::list_role_logs
	),
	components(
		schemas(
			Role,
			Department,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::UserUpdateRequest,
			models::user::RoleChangeRequest,
			models::task::Task,
			models::task::TaskSubmission,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::attendance::Attendance,
			models::salary::Salary,
			models::salary::SalaryCreateRequest,
			models::salary::SalaryUpdateRequest,
			models::request::Request,
			models::request::RequestCreateRequest,
			models::request::RequestRejectRequest,
			models::notification::Notification,
			models::performance::Performance,
			models::performance::RecomputeRequest,
			models::role_change_log::RoleChangeLog,
			routes::health::HealthResponse,
			routes::auth::MessageResponse
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Health", description = "Liveness and database checks"),
		(name = "Auth", description = "Registration, login and session identity"),
		(name = "Users", description = "User directory and role administration"),
		(name = "Tasks", description = "Task assignment, pipeline and submissions"),
		(name = "Attendance", description = "Daily attendance rows"),
		(name = "Salaries", description = "Monthly salary records"),
		(name = "Requests", description = "Leave, expense and task requests"),
		(name = "Notifications", description = "Per-user notification inbox"),
		(name = "Performance", description = "Monthly score buckets"),
		(name = "RoleLogs", description = "Hash-chained role change audit trail")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(
				HttpBuilder::new()
					.scheme(HttpAuthScheme::Bearer)
					.bearer_format("JWT")
					.build(),
			),
		);
	}
}

pub fn build_openapi() -> utoipa::openapi::OpenApi {
	ApiDoc::openapi()
}

/// Swagger UI at /docs, raw document at /api-docs/openapi.json.
pub fn swagger_routes<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
{
	SwaggerUi::new("/docs")
		.url("/api-docs/openapi.json", build_openapi())
		.into()
}

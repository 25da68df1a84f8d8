pub mod attendance;
pub mod auth;
pub mod health;
pub mod notifications;
pub mod performance;
pub mod requests;
pub mod role_logs;
pub mod salary;
pub mod tasks;
pub mod users;

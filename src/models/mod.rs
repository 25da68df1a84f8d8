pub mod attendance;
pub mod notification;
pub mod performance;
pub mod request;
pub mod role_change_log;
pub mod salary;
pub mod task;
pub mod user;

//! Authorization module
//!
//! One shared decision engine for the whole API:
//! - role lattice with numeric levels and department binding
//! - visibility filters applied to every list endpoint
//! - record access, mutation and role-assignment checks
//!
//! Every route handler resolves an [`Actor`] from the users table and asks
//! the engine before touching a row. The engine itself is pure and
//! synchronous; all IO stays in the routes.

mod actor;
mod engine;
mod role;

pub use actor::{Actor, TargetRef};
pub use engine::{can_access_record, can_assign_role, can_mutate, visibility, Visibility};
pub use role::{level, Department, Role};

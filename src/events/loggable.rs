use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity attached to emitted events and the notifications they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Audit-grade events (role changes): never trimmed
    Critical,
    /// Default level
    Important,
    /// High-volume events (logins): safe to trim aggressively
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Implemented by models whose changes flow through the event bus.
/// The entity type becomes the event-name prefix, e.g. `task.assigned`.
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    /// Usually the primary key; for task events the task id, etc.
    fn subject_id(&self) -> Uuid;

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "role_changed" => Severity::Critical,
            "logged_in" => Severity::Noise,
            _ => Severity::Important,
        }
    }
}

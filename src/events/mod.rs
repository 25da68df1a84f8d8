use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

/// Envelope carried on the bus. Payload stays JSON so the listener can
/// evolve independently of the emitting handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(
        name: impl Into<String>,
        actor_id: Option<Uuid>,
        subject_id: Option<Uuid>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget. A full or receiver-less channel must never fail the
    /// request that emitted the event.
    pub fn emit(&self, event: DomainEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("event bus has no listener, side effects skipped");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Request metadata captured for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Old/new snapshot plus request context, serialized into the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Emit a `{entity}.{action}` event for a loggable entity. Handlers call
/// this after their primary write has committed; nothing here can fail the
/// request.
pub fn emit_change<T: Loggable>(
    bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let name = format!("{}.{}", T::entity_type(), action);
    let severity = entity.severity_for_action(action);
    let payload = ChangePayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    bus.emit(DomainEvent::new(
        name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    ));
}

/// Background consumer translating events into notification rows and the
/// role-change audit log. Every write failure is logged and swallowed; the
/// API request that produced the event has already returned.
pub fn spawn_side_effect_listener(pool: SqlitePool, mut rx: broadcast::Receiver<DomainEvent>) {
    tokio::spawn(async move {
        tracing::info!("side-effect listener started");
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::error!(missed, "side-effect listener lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if let Err(err) = handle_event(&pool, &event).await {
                tracing::error!(event = %event.name, error = %err, "side effect failed");
            }
        }
    });
}

async fn handle_event(pool: &SqlitePool, event: &DomainEvent) -> anyhow::Result<()> {
    let current = event.payload.get("new").cloned().unwrap_or(Value::Null);
    let severity = event
        .payload
        .get("severity")
        .and_then(|s| s.as_str())
        .unwrap_or("important")
        .to_string();

    match event.name.as_str() {
        "user.logged_in" => {
            if let Some(user_id) = event.subject_id {
                insert_notification(pool, user_id, "Login recorded", "A login was recorded on your account.", &severity).await?;
            }
        }
        "user.role_changed" => {
            append_role_change(pool, event).await?;
            if let Some(user_id) = event.subject_id {
                let new_role = current
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                let body = format!("Your role is now {new_role}.");
                insert_notification(pool, user_id, "Role changed", &body, &severity).await?;
            }
        }
        "task.assigned" => {
            let assigned_to = current
                .get("assigned_to")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            if let Some(assignee) = assigned_to {
                let title = current.get("title").and_then(|v| v.as_str()).unwrap_or("a task");
                let body = format!("You have been assigned: {title}");
                insert_notification(pool, assignee, "Task assigned", &body, &severity).await?;
            }
        }
        "request.approved" | "request.rejected" => {
            let creator = current
                .get("user_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            if let Some(creator) = creator {
                let kind = current
                    .get("request_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("request");
                let (title, body) = if event.name.ends_with("approved") {
                    ("Request approved", format!("Your {kind} request was approved."))
                } else {
                    let reason = current
                        .get("rejection_reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("no reason given");
                    ("Request rejected", format!("Your {kind} request was rejected: {reason}"))
                };
                insert_notification(pool, creator, title, &body, &severity).await?;
            }
        }
        other => {
            tracing::debug!(event = other, "no side effect registered");
        }
    }

    Ok(())
}

async fn insert_notification(
    pool: &SqlitePool,
    user_id: Uuid,
    title: &str,
    body: &str,
    severity: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, title, body, severity, read, created_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(title)
    .bind(body)
    .bind(severity)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Append to the hash-chained role-change log. Each entry hashes
/// SHA256(prev_hash || payload) so retroactive edits break the chain.
async fn append_role_change(pool: &SqlitePool, event: &DomainEvent) -> anyhow::Result<()> {
    use sha2::{Digest, Sha256};

    let user_id = event
        .subject_id
        .ok_or_else(|| anyhow::anyhow!("role change event without subject"))?;

    let current = event.payload.get("new").cloned().unwrap_or(Value::Null);
    let old = event.payload.get("old").cloned().unwrap_or(Value::Null);
    let context = event.payload.get("context").cloned().unwrap_or(Value::Null);

    let old_role = old.get("role").and_then(|v| v.as_str()).unwrap_or("unknown");
    let new_role = current.get("role").and_then(|v| v.as_str()).unwrap_or("unknown");
    // pre-change identity snapshot, so the log stays meaningful after the
    // user row itself is edited or deleted
    let name = old.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let email = old.get("email").and_then(|v| v.as_str()).unwrap_or("");
    let department = old.get("department").and_then(|v| v.as_str());
    let ip = context.get("ip").and_then(|v| v.as_str());
    let user_agent = context.get("user_agent").and_then(|v| v.as_str());

    let payload_str = serde_json::to_string(&event.payload).unwrap_or_default();

    // rowid order, not timestamps: two changes in the same millisecond must
    // still chain deterministically
    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM role_change_log ORDER BY rowid DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let mut hasher = Sha256::new();
    if let Some(ref ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(payload_str.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO role_change_log
            (id, user_id, old_role, new_role, changed_by, user_name, user_email,
             user_department, ip, user_agent, prev_hash, hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(old_role)
    .bind(new_role)
    .bind(event.actor_id.map(|u| u.to_string()))
    .bind(name)
    .bind(email)
    .bind(department)
    .bind(ip)
    .bind(user_agent)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;

    Ok(())
}

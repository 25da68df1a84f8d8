use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use staffhub::create_app;

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

async fn register(
    app: &Router,
    name: &str,
    email: &str,
    role: &str,
    department: Option<&str>,
) -> Result<(String, String)> {
    let payload = json!({
        "name": name,
        "email": email,
        "password": "password123",
        "role": role,
        "department": department,
    });

    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?;

    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    if status != StatusCode::CREATED {
        panic!(
            "register {} failed: {} - {}",
            email,
            status,
            String::from_utf8_lossy(&body_bytes)
        );
    }

    let auth_res: Value = serde_json::from_slice(&body_bytes)?;
    let token = auth_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();
    let user_id = auth_res
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|v| v.as_str())
        .context("missing user id")?
        .to_string();

    Ok((token, user_id))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    payload: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

// The audit writer runs behind the event bus, so the log is read in a poll
// loop until the expected number of entries lands.
async fn wait_for_entries(app: &Router, token: &str, count: usize) -> Result<Vec<Value>> {
    for _ in 0..50 {
        let (status, logs) = send(app, "GET", "/role-logs", Some(token), None).await?;
        assert_eq!(status, StatusCode::OK);
        if let Some(entries) = logs.as_array() {
            if entries.len() >= count {
                return Ok(entries.clone());
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("audit log never reached {} entries", count);
}

#[tokio::test]
async fn role_changes_append_to_a_hash_chain() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (founder, founder_id) =
        register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (co, _) = register(&app, "Cora", "co@corp.test", "co_founder", None).await?;
    let (emp_token, emp_id) =
        register(&app, "Ted", "ted@corp.test", "employee", Some("technical")).await?;
    let (head_token, _) =
        register(&app, "Saul", "sales-head@corp.test", "sales_head", None).await?;
    let (_, emp2_id) =
        register(&app, "Sam", "sam@corp.test", "employee", Some("sales")).await?;

    // the trail is reserved for the top of the hierarchy
    let (status, _) = send(&app, "GET", "/role-logs", Some(&emp_token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/role-logs", Some(&head_token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/role-logs", Some(&co), None).await?;
    assert_eq!(status, StatusCode::OK);

    // first change: genesis entry with no predecessor
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&founder),
        Some(json!({ "role": "technical_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let entries = wait_for_entries(&app, &founder, 1).await?;
    let first = &entries[0];
    assert_eq!(first.get("old_role").and_then(|v| v.as_str()), Some("employee"));
    assert_eq!(
        first.get("new_role").and_then(|v| v.as_str()),
        Some("technical_head")
    );
    assert_eq!(
        first.get("user_email").and_then(|v| v.as_str()),
        Some("ted@corp.test")
    );
    assert_eq!(
        first.get("changed_by").and_then(|v| v.as_str()),
        Some(founder_id.as_str())
    );
    assert!(first.get("prev_hash").map(|v| v.is_null()).unwrap_or(false));
    let first_hash = first
        .get("hash")
        .and_then(|v| v.as_str())
        .context("missing hash")?
        .to_string();
    assert!(!first_hash.is_empty());

    // second change chains onto the first
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp2_id),
        Some(&founder),
        Some(json!({ "role": "finance_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let entries = wait_for_entries(&app, &founder, 2).await?;
    let second = &entries[1];
    assert_eq!(
        second.get("prev_hash").and_then(|v| v.as_str()),
        Some(first_hash.as_str())
    );
    assert_ne!(
        second.get("hash").and_then(|v| v.as_str()),
        Some(first_hash.as_str())
    );

    // the subject hears about it
    let mut role_note = None;
    for _ in 0..50 {
        let (_, notifications) =
            send(&app, "GET", "/notifications", Some(&emp_token), None).await?;
        role_note = notifications.as_array().and_then(|n| {
            n.iter()
                .find(|v| v.get("title").and_then(|t| t.as_str()) == Some("Role changed"))
                .cloned()
        });
        if role_note.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    let note = role_note.context("role change never reached the inbox")?;
    assert!(note
        .get("body")
        .and_then(|b| b.as_str())
        .map(|b| b.contains("technical_head"))
        .unwrap_or(false));

    Ok(())
}

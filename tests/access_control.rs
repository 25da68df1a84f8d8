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

#[tokio::test]
async fn directory_visibility_per_role() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (founder, founder_id) =
        register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (co, co_id) = register(&app, "Cora", "co@corp.test", "co_founder", None).await?;
    let (tech_head, _) =
        register(&app, "Tia", "tech-head@corp.test", "technical_head", None).await?;
    let (emp_tech, emp_tech_id) = register(
        &app,
        "Ted",
        "ted@corp.test",
        "employee",
        Some("technical"),
    )
    .await?;
    let (_emp_sales, emp_sales_id) =
        register(&app, "Sam", "sam@corp.test", "employee", Some("sales")).await?;

    // founder: the whole directory
    let (status, users) = send(&app, "GET", "/users", Some(&founder), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().map(Vec::len), Some(5));

    // co-founder: everyone but the founder
    let (_, users) = send(&app, "GET", "/users", Some(&co), None).await?;
    let emails: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u.get("email").and_then(|e| e.as_str()))
        .collect();
    assert_eq!(emails.len(), 4);
    assert!(!emails.contains(&"founder@corp.test"));

    // department head: own-department employees only
    let (_, users) = send(&app, "GET", "/users", Some(&tech_head), None).await?;
    let emails: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u.get("email").and_then(|e| e.as_str()))
        .collect();
    assert_eq!(emails, vec!["ted@corp.test"]);

    // employee: self only
    let (_, users) = send(&app, "GET", "/users", Some(&emp_tech), None).await?;
    assert_eq!(users.as_array().map(Vec::len), Some(1));

    // point reads agree with the list filter: invisible rows read as absent
    let uri = format!("/users/{}", emp_sales_id);
    let (status, _) = send(&app, "GET", &uri, Some(&emp_tech), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &uri, Some(&tech_head), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &uri, Some(&founder), None).await?;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/users/{}", founder_id);
    let (status, _) = send(&app, "GET", &uri, Some(&co), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // a head still reads their own employee
    let uri = format!("/users/{}", emp_tech_id);
    let (status, _) = send(&app, "GET", &uri, Some(&tech_head), None).await?;
    assert_eq!(status, StatusCode::OK);

    // the hierarchy is one-directional: the co-founder cannot touch the
    // founder, the founder can touch the co-founder
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/{}", founder_id),
        Some(&co),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/{}", co_id),
        Some(&founder),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn department_walls_hold_for_tasks() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (founder, _) = register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (tech_head, _) =
        register(&app, "Tia", "tech-head@corp.test", "technical_head", None).await?;
    let (sales_head, _) =
        register(&app, "Saul", "sales-head@corp.test", "sales_head", None).await?;
    let (_, emp_id) = register(
        &app,
        "Ted",
        "ted@corp.test",
        "employee",
        Some("technical"),
    )
    .await?;

    let (status, task) = send(
        &app,
        "POST",
        "/tasks",
        Some(&founder),
        Some(json!({ "title": "Wire the rack", "assigned_to": emp_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing task id")?
        .to_string();

    // the wrong-department head never sees the task
    let (_, tasks) = send(&app, "GET", "/tasks", Some(&sales_head), None).await?;
    assert_eq!(tasks.as_array().map(Vec::len), Some(0));
    let (status, _) = send(
        &app,
        "GET",
        &format!("/tasks/{}", task_id),
        Some(&sales_head),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // and cannot mutate it either
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/tasks/{}", task_id),
        Some(&sales_head),
        Some(json!({ "title": "Hijacked" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/tasks/{}", task_id),
        Some(&sales_head),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the right head does all of it
    let (status, _) = send(
        &app,
        "GET",
        &format!("/tasks/{}", task_id),
        Some(&tech_head),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/tasks/{}", task_id),
        Some(&tech_head),
        Some(json!({ "priority": "high" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/tasks/{}", task_id),
        Some(&tech_head),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn mutation_requires_strictly_higher_rank() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (founder, _) = register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (tech_head, _) =
        register(&app, "Tia", "tech-head@corp.test", "technical_head", None).await?;
    let (emp_tech, emp_tech_id) = register(
        &app,
        "Ted",
        "ted@corp.test",
        "employee",
        Some("technical"),
    )
    .await?;
    let (emp_sales, emp_sales_id) =
        register(&app, "Sam", "sam@corp.test", "employee", Some("sales")).await?;

    // self-service profile edit is always allowed
    let (status, user) = send(
        &app,
        "PUT",
        &format!("/users/{}", emp_tech_id),
        Some(&emp_tech),
        Some(json!({ "name": "Ted Renamed" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user.get("name").and_then(|v| v.as_str()), Some("Ted Renamed"));

    // peers do not edit each other
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", emp_tech_id),
        Some(&emp_sales),
        Some(json!({ "name": "Hijacked" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // heads stop at their department boundary
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", emp_sales_id),
        Some(&tech_head),
        Some(json!({ "name": "Hijacked" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}", emp_tech_id),
        Some(&tech_head),
        Some(json!({ "name": "Ted Again" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // delete is deactivation: the account stops logging in but the row survives
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/{}", emp_tech_id),
        Some(&tech_head),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ted@corp.test", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(
        err.get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.contains("deactivated"))
            .unwrap_or(false),
        "unexpected login error: {}",
        err
    );

    let (_, users) = send(&app, "GET", "/users", Some(&founder), None).await?;
    let emails: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u.get("email").and_then(|e| e.as_str()))
        .collect();
    assert!(!emails.contains(&"ted@corp.test"));

    // no new work lands on a deactivated account
    let (status, _) = send(
        &app,
        "POST",
        "/tasks",
        Some(&founder),
        Some(json!({ "title": "Ghost task", "assigned_to": emp_tech_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn role_grants_respect_the_ceiling() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (founder, founder_id) =
        register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (co, _) = register(&app, "Cora", "co@corp.test", "co_founder", None).await?;
    let (tech_head, _) =
        register(&app, "Tia", "tech-head@corp.test", "technical_head", None).await?;
    let (emp, emp_id) = register(
        &app,
        "Ted",
        "ted@corp.test",
        "employee",
        Some("technical"),
    )
    .await?;
    let (_, emp2_id) =
        register(&app, "Fin", "fin@corp.test", "employee", Some("finance")).await?;

    // nobody touches their own role
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&emp),
        Some(json!({ "role": "technical_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a head cannot mint a peer
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&tech_head),
        Some(json!({ "role": "sales_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the founder cannot clone themselves
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&founder),
        Some(json!({ "role": "founder" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // and nobody edits the founder at all
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", founder_id),
        Some(&co),
        Some(json!({ "role": "employee", "department": "sales" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a valid promotion rebinds the department to the role
    let (status, user) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&founder),
        Some(json!({ "role": "technical_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "promotion failed: {}", user);
    assert_eq!(
        user.get("role").and_then(|v| v.as_str()),
        Some("technical_head")
    );
    assert_eq!(
        user.get("department").and_then(|v| v.as_str()),
        Some("technical")
    );

    // the promotion produced exactly one audit entry
    let mut entries = 0;
    for _ in 0..50 {
        let (_, logs) = send(&app, "GET", "/role-logs", Some(&founder), None).await?;
        entries = logs.as_array().map(Vec::len).unwrap_or(0);
        if entries >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert_eq!(entries, 1);

    // re-granting the held role is a quiet no-op: no change, no audit entry
    let (status, user) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp_id),
        Some(&founder),
        Some(json!({ "role": "technical_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        user.get("role").and_then(|v| v.as_str()),
        Some("technical_head")
    );
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let (_, logs) = send(&app, "GET", "/role-logs", Some(&founder), None).await?;
    assert_eq!(logs.as_array().map(Vec::len), Some(1));

    // co-founders promote below their own level
    let (status, user) = send(
        &app,
        "PUT",
        &format!("/users/{}/role", emp2_id),
        Some(&co),
        Some(json!({ "role": "finance_head" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "co-founder grant failed: {}", user);

    Ok(())
}

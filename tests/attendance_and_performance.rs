use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Datelike;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use staffhub::create_app;

// Thresholds are read from the environment at app construction, so the whole
// attendance story runs as one sequential test: each stage re-reads the env
// through a fresh router over the same pool.

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

async fn login(app: &Router, email: &str) -> Result<(StatusCode, Value)> {
    send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": "password123" })),
    )
    .await
}

#[tokio::test]
async fn attendance_lifecycle() -> Result<()> {
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

    // stage 1: nobody is late
    std::env::set_var("LATE_LOGIN_THRESHOLD", "23:59");
    std::env::set_var("HALF_DAY_THRESHOLD", "23:59");
    let app = create_app(pool.clone()).await?;

    let (founder, _) = register(&app, "Freya", "founder@corp.test", "founder", None).await?;
    let (_, emp_id) = register(
        &app,
        "Ted",
        "ted@corp.test",
        "employee",
        Some("technical"),
    )
    .await?;

    // no attendance before the first login
    let (login_status, auth) = login(&app, "ted@corp.test").await?;
    assert_eq!(login_status, StatusCode::OK, "login failed: {}", auth);
    let emp = auth
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();

    let (status, today) = send(&app, "GET", "/attendance/today", Some(&emp), None).await?;
    assert_eq!(status, StatusCode::OK, "no attendance row: {}", today);
    assert_eq!(today.get("status").and_then(|v| v.as_str()), Some("present"));
    assert_eq!(today.get("late").and_then(|v| v.as_bool()), Some(false));
    assert!(today.get("login_time").map(|v| !v.is_null()).unwrap_or(false));
    assert!(today.get("logout_time").map(|v| v.is_null()).unwrap_or(false));

    // a second login does not mint a second row
    login(&app, "ted@corp.test").await?;
    let (_, rows) = send(&app, "GET", "/attendance", Some(&founder), None).await?;
    let emp_rows = rows
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r.get("user_id").and_then(|v| v.as_str()) == Some(emp_id.as_str()))
        .count();
    assert_eq!(emp_rows, 1);

    // first logout stamps the row, later logouts leave it alone
    let (status, _) = send(&app, "POST", "/auth/logout", Some(&emp), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, today) = send(&app, "GET", "/attendance/today", Some(&emp), None).await?;
    let first_logout = today
        .get("logout_time")
        .and_then(|v| v.as_str())
        .context("logout_time not set")?
        .to_string();

    send(&app, "POST", "/auth/logout", Some(&emp), None).await?;
    let (_, today) = send(&app, "GET", "/attendance/today", Some(&emp), None).await?;
    assert_eq!(
        today.get("logout_time").and_then(|v| v.as_str()),
        Some(first_logout.as_str())
    );

    // point read follows the owner's visibility
    let row_id = today
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing attendance id")?
        .to_string();
    let (status, _) = send(
        &app,
        "GET",
        &format!("/attendance/{}", row_id),
        Some(&founder),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // stage 2: everyone is late
    std::env::set_var("LATE_LOGIN_THRESHOLD", "00:00");
    let late_app = create_app(pool.clone()).await?;

    let (_, late_id) = register(
        &late_app,
        "Lara",
        "lara@corp.test",
        "employee",
        Some("sales"),
    )
    .await?;
    let (_, auth) = login(&late_app, "lara@corp.test").await?;
    let lara = auth
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();

    let (_, today) = send(&late_app, "GET", "/attendance/today", Some(&lara), None).await?;
    assert_eq!(today.get("late").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(today.get("status").and_then(|v| v.as_str()), Some("present"));

    // the late login fed the monthly bucket exactly once
    let (status, buckets) = send(
        &late_app,
        "GET",
        &format!("/performance/{}", late_id),
        Some(&founder),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let bucket = buckets
        .as_array()
        .and_then(|b| b.first())
        .context("missing bucket")?;
    assert_eq!(bucket.get("late_logins").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(bucket.get("total_score").and_then(|v| v.as_i64()), Some(-5));

    // repeat login, same day: no second penalty
    login(&late_app, "lara@corp.test").await?;
    let (_, buckets) = send(
        &late_app,
        "GET",
        &format!("/performance/{}", late_id),
        Some(&founder),
        None,
    )
    .await?;
    let bucket = buckets.as_array().and_then(|b| b.first()).unwrap();
    assert_eq!(bucket.get("late_logins").and_then(|v| v.as_i64()), Some(1));

    // stage 3: late enough to count as half a day
    std::env::set_var("HALF_DAY_THRESHOLD", "00:00");
    let half_app = create_app(pool.clone()).await?;

    register(
        &half_app,
        "Hal",
        "hal@corp.test",
        "employee",
        Some("finance"),
    )
    .await?;
    let (_, auth) = login(&half_app, "hal@corp.test").await?;
    let hal = auth
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();
    let (_, today) = send(&half_app, "GET", "/attendance/today", Some(&hal), None).await?;
    assert_eq!(today.get("status").and_then(|v| v.as_str()), Some("half_day"));

    // recompute rebuilds the bucket from the attendance rows themselves
    let now = chrono::Utc::now();
    let (status, buckets) = send(
        &late_app,
        "POST",
        "/performance/recompute",
        Some(&founder),
        Some(json!({
            "user_id": late_id,
            "month": now.month(),
            "year": now.year(),
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "recompute failed: {}", buckets);
    let bucket = buckets
        .as_array()
        .and_then(|b| b.first())
        .context("missing recomputed bucket")?;
    assert_eq!(bucket.get("late_logins").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(bucket.get("total_score").and_then(|v| v.as_i64()), Some(-5));

    // recompute is a mutation, peers are refused
    let (status, _) = send(
        &late_app,
        "POST",
        "/performance/recompute",
        Some(&lara),
        Some(json!({
            "user_id": emp_id,
            "month": now.month(),
            "year": now.year(),
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // month 13 never recomputes
    let (status, _) = send(
        &late_app,
        "POST",
        "/performance/recompute",
        Some(&founder),
        Some(json!({ "user_id": late_id, "month": 13, "year": now.year() })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

// tests/auth_tests.rs

use lms_backend::{config::Config, routes, state::AppState};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Spawns the app on a random port over a dedicated in-memory database.
/// Returns the base URL and the pool, so tests can seed and inspect
/// through the same storage the server uses.
async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        sweep_interval_secs: 3600,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn account_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn register_works() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "student_one",
            "password": "password123",
            "email": "one@example.com"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["username"], "student_one");
    assert_eq!(body["is_verified"], false);
    // the hash never leaves the server
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn register_fails_validation() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    for expected in [201, 409] {
        let response = client
            .post(format!("{}/api/auth/register", address))
            .json(&serde_json::json!({
                "username": "repeat_me",
                "password": "password123"
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected);
    }
}

#[tokio::test]
async fn login_is_gated_on_admin_verification() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "pending_user",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");

    // Unverified: reconciled/registered but no login session yet.
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "pending_user",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed");
    assert_eq!(response.status().as_u16(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "pending_verification");

    sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE username = 'pending_user'")
        .execute(&pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "pending_user",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "careful_user",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");
    sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE username = 'careful_user'")
        .execute(&pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "careful_user",
            "password": "not-the-password"
        }))
        .send()
        .await
        .expect("Login failed");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn federated_new_claim_creates_one_pending_account() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let claim = serde_json::json!({
        "email": "fresh@example.com",
        "external_subject": "sub-fresh-1",
        "display_name": "Fresh Student"
    });

    let response = client
        .post(format!("{}/api/auth/federated", address))
        .json(&claim)
        .send()
        .await
        .expect("Federated login failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "needs_profile");
    assert!(
        body["account"]["username"]
            .as_str()
            .unwrap()
            .starts_with("fed_")
    );
    assert_eq!(body["account"]["is_verified"], false);

    // Reconciling the same claim again must not create a second account.
    let response = client
        .post(format!("{}/api/auth/federated", address))
        .json(&claim)
        .send()
        .await
        .expect("Federated login failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "needs_profile");

    assert_eq!(account_count(&pool).await, 1);
}

#[tokio::test]
async fn federated_email_match_binds_and_rewrites_username() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "local_alice",
            "password": "password123",
            "email": "a@x.com"
        }))
        .send()
        .await
        .expect("Register failed");

    let response = client
        .post(format!("{}/api/auth/federated", address))
        .json(&serde_json::json!({
            "email": "a@x.com",
            "external_subject": "sub1",
            "display_name": "Alice"
        }))
        .send()
        .await
        .expect("Federated login failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    // account existed with verification=false, so the merge logs nobody in
    assert_eq!(body["outcome"], "pending_verification");

    let (username, subject): (String, Option<String>) = sqlx::query_as(
        "SELECT username, external_subject FROM accounts WHERE email = 'a@x.com'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(username.starts_with("fed_"));
    assert_eq!(subject.as_deref(), Some("sub1"));
    assert_eq!(account_count(&pool).await, 1);

    // Once verified, the same claim completes a login.
    sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE email = 'a@x.com'")
        .execute(&pool)
        .await
        .unwrap();
    let response = client
        .post(format!("{}/api/auth/federated", address))
        .json(&serde_json::json!({
            "email": "a@x.com",
            "external_subject": "sub1"
        }))
        .send()
        .await
        .expect("Federated login failed");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "logged_in");
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn federated_conflicting_subject_is_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "local_bob",
            "password": "password123",
            "email": "b@x.com"
        }))
        .send()
        .await
        .expect("Register failed");

    // First claim binds sub1 to the account.
    client
        .post(format!("{}/api/auth/federated", address))
        .json(&serde_json::json!({
            "email": "b@x.com",
            "external_subject": "sub1"
        }))
        .send()
        .await
        .expect("Federated login failed");

    // A different subject with the same email is a conflict, not a rebind.
    let response = client
        .post(format!("{}/api/auth/federated", address))
        .json(&serde_json::json!({
            "email": "b@x.com",
            "external_subject": "sub2"
        }))
        .send()
        .await
        .expect("Federated login failed");
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "conflicting_subject");

    let subject: Option<String> =
        sqlx::query_scalar("SELECT external_subject FROM accounts WHERE email = 'b@x.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(subject.as_deref(), Some("sub1"));
}

#[tokio::test]
async fn completing_the_profile_advances_to_pending_verification() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/federated", address))
        .json(&serde_json::json!({
            "email": "c@x.com",
            "external_subject": "sub-c"
        }))
        .send()
        .await
        .expect("Federated login failed");

    let response = client
        .post(format!("{}/api/auth/federated/profile", address))
        .json(&serde_json::json!({
            "external_subject": "sub-c",
            "display_name": "Carol <script>alert(1)</script>"
        }))
        .send()
        .await
        .expect("Profile completion failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "pending_verification");
    let name = body["account"]["display_name"].as_str().unwrap();
    assert!(!name.contains("<script>"));
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/certificates", address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_refuse_students() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "plain_student",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");
    sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE username = 'plain_student'")
        .execute(&pool)
        .await
        .unwrap();

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "plain_student",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/admin/accounts", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn admin_verification_unlocks_login() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // admin + student
    for (name, role) in [("the_admin", "admin"), ("new_student", "student")] {
        client
            .post(format!("{}/api/auth/register", address))
            .json(&serde_json::json!({
                "username": name,
                "password": "password123"
            }))
            .send()
            .await
            .expect("Register failed");
        sqlx::query("UPDATE accounts SET role = $1 WHERE username = $2")
            .bind(role)
            .bind(name)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE username = 'the_admin'")
        .execute(&pool)
        .await
        .unwrap();

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "the_admin",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();
    let admin_token = login["token"].as_str().unwrap();

    let student_id: i64 =
        sqlx::query_scalar("SELECT id FROM accounts WHERE username = 'new_student'")
            .fetch_one(&pool)
            .await
            .unwrap();

    let response = client
        .post(format!(
            "{}/api/admin/accounts/{}/verify",
            address, student_id
        ))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .expect("Verify failed");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["is_verified"], true);
    assert!(body["verified_at"].as_str().is_some());

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "new_student",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed");
    assert_eq!(response.status().as_u16(), 200);
}

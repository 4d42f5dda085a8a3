use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

mod common;
use common::{KillOnDrop, get_free_port, spawn_server, temp_db_path, wait_for_listening};

#[tokio::test]
async fn signup_login_and_bearer_checks() {
    securevault_server::install_crypto_provider();
    let port = get_free_port();
    let db = temp_db_path("flow");
    let child = spawn_server(port, &db);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 20).await;

    let client = Client::builder().build().expect("client");
    let base = format!("http://127.0.0.1:{port}");

    let resp = client
        .post(format!("{base}/signup"))
        .json(&json!({"email": "alice@example.com", "password": "hunter22", "user_id": "alice"}))
        .send()
        .await
        .expect("failed to post signup");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers().contains_key("x-request-id"),
        "request id is propagated"
    );

    // No membership yet, so the credentials are right but the project is not.
    let resp = client
        .post(format!("{base}/login"))
        .json(&json!({
            "email": "alice@example.com",
            "password": "hunter22",
            "company_id": "acme",
            "team_id": "research",
            "project_id": "apollo",
        }))
        .send()
        .await
        .expect("failed to post login");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(
        body,
        json!({"detail": "You do not have access to this project. Contact your manager/admin."})
    );

    let resp = client
        .get(format!("{base}/search?query=anything"))
        .send()
        .await
        .expect("failed to get search");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body, json!({"detail": "Not authenticated"}));

    let resp = client
        .get(format!("{base}/search?query=anything"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("failed to get search");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body, json!({"detail": "Invalid or expired token"}));
}

//! Account creation and password login.

use std::sync::LazyLock;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use chrono::{Duration, Utc};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    app::{AppState, Scope, db},
    http::{
        ApiError, ApiResult,
        auth::{Claims, password},
    },
};

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$").ok()
});

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

#[derive(Deserialize)]
pub(crate) struct SignupRequest {
    email: String,
    password: SecretString,
    user_id: String,
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: SecretString,
    company_id: String,
    team_id: String,
    project_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

fn valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email))
}

/// Malformed bodies are 422 like any other validation failure.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))
}

#[tracing::instrument(skip_all)]
async fn signup(
    State(AppState { db_pool, .. }): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let SignupRequest {
        email,
        password,
        user_id,
    } = json_body(body)?;
    if !valid_email(&email) {
        return Err(ApiError::Unprocessable(
            "value is not a valid email address".to_string(),
        ));
    }

    const DUPLICATE: &str = "User with this email or user_id already exists";
    if db::user_exists(&db_pool, &email, &user_id).await? {
        return Err(ApiError::bad_request(DUPLICATE));
    }

    let password_hash = password::hash(password).await?;
    match db::insert_user(&db_pool, &user_id, &email, &password_hash).await {
        Ok(()) => {}
        // Lost a race against a concurrent signup.
        Err(ref err) if db::is_unique_violation(err) => return Err(ApiError::bad_request(DUPLICATE)),
        Err(err) => return Err(err.into()),
    }
    info!(%user_id, "User created");

    Ok(Json(json!({
        "status": "ok",
        "message": "User created. Ask an admin to give you access to a project.",
    })))
}

#[tracing::instrument(skip_all)]
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let LoginRequest {
        email,
        password,
        company_id,
        team_id,
        project_id,
    } = json_body(body)?;
    if !valid_email(&email) {
        return Err(ApiError::Unprocessable(
            "value is not a valid email address".to_string(),
        ));
    }

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let user = db::find_user_by_email(&state.db_pool, &email)
        .await?
        .ok_or_else(invalid)?;
    if !password::verify(password, user.password_hash).await? {
        return Err(invalid());
    }

    let scope = Scope {
        company_id,
        team_id,
        project_id,
    };
    let role = db::find_membership_role(&state.db_pool, &user.user_id, &scope)
        .await?
        .ok_or_else(|| {
            ApiError::forbidden(
                "You do not have access to this project. Contact your manager/admin.",
            )
        })?;

    let expires = Utc::now() + Duration::hours(i64::from(state.config.auth.session_hours));
    let Scope {
        company_id,
        team_id,
        project_id,
    } = scope;
    let claims = Claims {
        user_id: Some(user.user_id.clone()),
        company_id: Some(company_id),
        team_id: Some(team_id),
        project_id: Some(project_id),
        roles: vec![role.to_string()],
        exp: Some(expires.timestamp()),
    };
    let access_token = state
        .jwt
        .issue(&claims)
        .map_err(|err| ApiError::Internal(err.into()))?;
    info!(user_id = %user.user_id, %role, "Login succeeded");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    use super::*;
    use crate::{
        app::{Role, test_support::{TestApp, scope}},
        http::{auth::user_from_claims, server::router::routed_app},
    };

    async fn post_json(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = routed_app(app.state.clone())
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn signup_body(email: &str, user_id: &str) -> Value {
        json!({"email": email, "password": "hunter22", "user_id": user_id})
    }

    fn login_body(password: &str) -> Value {
        json!({
            "email": "alice@example.com",
            "password": password,
            "company_id": "acme",
            "team_id": "research",
            "project_id": "apollo",
        })
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("alice@example.com"), "plain address");
        assert!(valid_email("a.b+tag@sub.example.org"), "tagged address");
        assert!(!valid_email("alice"), "no domain");
        assert!(!valid_email("alice@localhost"), "no dot in domain");
        assert!(!valid_email("al ice@example.com"), "whitespace");
    }

    #[tokio::test]
    async fn signup_then_duplicate() {
        let app = TestApp::new().await;
        let (status, body) =
            post_json(&app, "/signup", signup_body("alice@example.com", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "ok",
                "message": "User created. Ask an admin to give you access to a project.",
            })
        );

        let (status, body) =
            post_json(&app, "/signup", signup_body("other@example.com", "alice")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"detail": "User with this email or user_id already exists"})
        );
    }

    #[tokio::test]
    async fn signup_rejects_bad_input() {
        let app = TestApp::new().await;
        let (status, _) = post_json(&app, "/signup", signup_body("not-an-email", "bob")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = post_json(&app, "/signup", json!({"email": "bob@example.com"})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.get("detail").is_some(), "error detail present");
    }

    #[tokio::test]
    async fn login_requires_password_and_membership() {
        let app = TestApp::new().await;
        post_json(&app, "/signup", signup_body("alice@example.com", "alice")).await;

        let (status, body) = post_json(&app, "/login", login_body("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Invalid email or password"}));

        let (status, body) = post_json(&app, "/login", login_body("hunter22")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({"detail": "You do not have access to this project. Contact your manager/admin."})
        );

        db::insert_membership(&app.state.db_pool, "alice", &scope(), Role::Manager)
            .await
            .expect("membership");
        let (status, body) = post_json(&app, "/login", login_body("hunter22")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("token_type"), Some(&json!("bearer")));

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .expect("token");
        let claims = app.state.jwt.decode(token).expect("valid token");
        let exp = claims.exp.expect("exp");
        let remaining = exp - Utc::now().timestamp();
        assert!(
            (11 * 3600..=12 * 3600).contains(&remaining),
            "expires after the session length, got {remaining}s"
        );
        let user = user_from_claims(claims).expect("user");
        assert_eq!(user.roles, vec![Role::Manager]);
        assert_eq!(user.scope, Some(scope()));
    }

    #[tokio::test]
    async fn unknown_email_looks_like_wrong_password() {
        let app = TestApp::new().await;
        let (status, body) = post_json(&app, "/login", login_body("whatever")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Invalid email or password"}));
    }
}

//! Similarity search over the caller's project documents.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    app::{AppState, Scope, User, db, retrieval},
    clients::Match,
    http::{ApiError, ApiResult},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_docs))
        .route("/query", post(query_docs))
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryParams {
    pub query: String,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    filename: Value,
    page: Value,
    content: Value,
    score: Option<f32>,
}

impl From<&Match> for SearchResult {
    fn from(found: &Match) -> Self {
        let na = || json!("N/A");
        Self {
            filename: found.doc_name().map_or_else(na, |name| json!(name)),
            page: found.page().map_or_else(na, |page| json!(page)),
            content: json!(found.text().unwrap_or("No text found")),
            score: found.score,
        }
    }
}

/// The project the caller queries. Tokens without one cannot search.
pub(crate) fn caller_scope(user: &User) -> ApiResult<&Scope> {
    user.scope
        .as_ref()
        .ok_or_else(|| ApiError::forbidden("You do not have access to this project"))
}

pub(crate) fn query_text<E: ToString>(query: Result<QueryParams, E>) -> ApiResult<String> {
    query
        .map(|params| params.query)
        .map_err(|rejection| ApiError::Unprocessable(rejection.to_string()))
}

async fn search(state: &AppState, scope: &Scope, query: &str) -> ApiResult<Value> {
    let matches = retrieval::retrieve(state, scope, query).await?;
    if matches.is_empty() {
        return Ok(json!({"answer": "No relevant documents found."}));
    }
    let results: Vec<SearchResult> = matches.iter().map(SearchResult::from).collect();
    Ok(json!({
        "answer": format!("Found {} relevant chunks:", results.len()),
        "results": results,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
async fn search_docs(
    State(state): State<AppState>,
    user: User,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let query = query_text(params.map(|Query(inner)| inner))?;
    let scope = caller_scope(&user)?;
    search(&state, scope, &query).await.map(Json)
}

/// Like `/search`, with the question taken from a JSON body and written to the audit log.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
async fn query_docs(
    State(state): State<AppState>,
    user: User,
    body: Result<Json<QueryParams>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let query = query_text(body.map(|Json(inner)| inner))?;
    let scope = caller_scope(&user)?;
    let response = search(&state, scope, &query).await?;

    let returned = response
        .get("results")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    db::insert_audit(
        &state.db_pool,
        None,
        &user.user_id,
        scope,
        "query",
        &json!({"query": query, "results": returned}),
    )
    .await?;
    Ok(Json(response))
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
        app::{
            Role,
            test_support::{FakeEmbedder, TestApp, scope, test_config},
        },
        http::server::router::routed_app,
    };

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = routed_app(app.state.clone())
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_search(token: &str, query: &str) -> Request<Body> {
        Request::get(format!("/search?query={query}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn empty_index_answers_politely() {
        let app = TestApp::new().await;
        let token = app.token("mia", Some(&scope()), Role::Member);
        let (status, body) = send(&app, get_search(&token, "revenue")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"answer": "No relevant documents found."}));
        assert_eq!(app.embedder.calls(), vec![vec!["revenue".to_string()]]);
    }

    #[tokio::test]
    async fn matches_are_listed_with_fallbacks() {
        let app = TestApp::new().await;
        let bare: Match = serde_json::from_value(json!({"id": "v2"})).expect("match");
        app.index
            .set_matches(vec![TestApp::chunk_match("v1", "Revenue grew.", 2), bare]);
        let token = app.token("mia", Some(&scope()), Role::Member);

        let (status, body) = send(&app, get_search(&token, "revenue")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "answer": "Found 2 relevant chunks:",
                "results": [
                    {"filename": "report.pdf", "page": 2, "content": "Revenue grew.", "score": 0.75},
                    {"filename": "N/A", "page": "N/A", "content": "No text found", "score": null},
                ],
            })
        );
    }

    #[tokio::test]
    async fn query_parameter_is_required() {
        let app = TestApp::new().await;
        let token = app.token("mia", Some(&scope()), Role::Member);
        let request = Request::get("/search")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn embedding_failures_are_bad_gateway() {
        let app = TestApp::with_embedder(test_config(), FakeEmbedder::failing()).await;
        let token = app.token("mia", Some(&scope()), Role::Member);
        let (status, body) = send(&app, get_search(&token, "revenue")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, json!({"detail": "Upstream service error"}));

        let request = Request::post("/query")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"query": "revenue"}).to_string()))
            .expect("request");
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, json!({"detail": "Upstream service error"}));
        let audit = db::audit_for_scope(&app.state.db_pool, &scope())
            .await
            .expect("audit");
        assert!(audit.is_empty(), "failed queries are not audited");
        assert!(app.index.queries().is_empty(), "index not consulted");
    }

    #[tokio::test]
    async fn post_query_is_audited() {
        let app = TestApp::new().await;
        app.index
            .set_matches(vec![TestApp::chunk_match("v1", "Revenue grew.", 2)]);
        let token = app.token("mia", Some(&scope()), Role::Member);
        let request = Request::post("/query")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"query": "revenue"}).to_string()))
            .expect("request");

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("answer"), Some(&json!("Found 1 relevant chunks:")));

        let audit = db::audit_for_scope(&app.state.db_pool, &scope())
            .await
            .expect("audit");
        let entry = audit.first().expect("query entry");
        assert_eq!(entry.action, "query");
        assert_eq!(entry.document_id, None);
        assert_eq!(
            serde_json::from_str::<Value>(&entry.meta).expect("meta"),
            json!({"query": "revenue", "results": 1})
        );
    }
}

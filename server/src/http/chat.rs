//! Answers questions from the caller's documents with the chat model.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    app::{AppState, User, retrieval},
    clients::{ChatMessage, Match},
    http::{
        ApiResult,
        search::{QueryParams, caller_scope, query_text},
    },
};

const SYSTEM_PROMPT: &str = "You are a helpful AI that answers based ONLY on the provided document.";

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/chat", get(chat))
}

fn context(matches: &[Match]) -> String {
    matches
        .iter()
        .map(|found| {
            let page = found
                .page()
                .map_or_else(|| "N/A".to_string(), |page| page.to_string());
            format!("Page {page}: {}", found.text().unwrap_or_default())
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn prompt(context: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Use ONLY this context:\n\n{context}\n\nQuestion: {query}"
        )),
    ]
}

#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
async fn chat(
    State(state): State<AppState>,
    user: User,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let query = query_text(params.map(|Query(inner)| inner))?;
    let scope = caller_scope(&user)?;

    let matches = retrieval::retrieve(&state, scope, &query).await?;
    if matches.is_empty() {
        return Ok(Json(
            json!({"answer": "No relevant information found in your documents."}),
        ));
    }
    debug!(chunks = matches.len(), "Building chat context");

    let answer = state.chat.complete(&prompt(&context(&matches), &query)).await?;
    info!(chunks = matches.len(), "Chat answered");
    Ok(Json(json!({ "answer": answer })))
}

//! Scoped similarity search shared by `/search`, `/query` and `/chat`.

use serde_json::{Value, json};
use tracing::warn;

use crate::{
    app::{AppState, Scope},
    clients::{ClientError, Match, VectorQuery},
};

/// Matches returned per query.
pub(crate) const TOP_K: u32 = 5;

/// Metadata filter restricting matches to one project.
pub(crate) fn scope_filter(scope: &Scope) -> Value {
    json!({
        "company_id": {"$eq": scope.company_id},
        "team_id": {"$eq": scope.team_id},
        "project_id": {"$eq": scope.project_id},
    })
}

/// Embeds `query` and returns the closest chunks of the caller's project.
///
/// Index failures are logged and reported as no matches.
///
/// # Errors
///
/// Returns an error if the query cannot be embedded.
pub(crate) async fn retrieve(
    state: &AppState,
    scope: &Scope,
    query: &str,
) -> Result<Vec<Match>, ClientError> {
    let vector = state
        .embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Decode {
            service: "embeddings",
            reason: "no embedding returned for query".to_string(),
        })?;

    let request = VectorQuery {
        vector,
        top_k: TOP_K,
        namespace: scope.company_id.clone(),
        filter: scope_filter(scope),
    };
    match state.index.query(&request).await {
        Ok(matches) => Ok(matches),
        Err(err) => {
            warn!(error = %err, "Vector query failed, treating as no matches");
            Ok(Vec::new())
        }
    }
}

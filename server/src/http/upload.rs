//! PDF upload and ingestion.

use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::post,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    app::{AppState, Scope, User, db},
    http::{ApiError, ApiResult},
    ingest::{self, Upload},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload_pdf))
}

const NO_ACCESS: &str = "You do not have access to this project";

/// Admins and owners may upload to their project without a membership row.
///
/// # Errors
///
/// 403 when the caller has no project scope or no membership in it.
pub(crate) async fn check_access<'user>(state: &AppState, user: &'user User) -> ApiResult<&'user Scope> {
    let scope = user.scope.as_ref().ok_or_else(|| ApiError::forbidden(NO_ACCESS))?;
    if user.bypasses_membership() {
        return Ok(scope);
    }
    db::find_membership_role(&state.db_pool, &user.user_id, scope)
        .await?
        .map(|_| scope)
        .ok_or_else(|| ApiError::forbidden(NO_ACCESS))
}

struct PdfUpload {
    filename: String,
    bytes: Vec<u8>,
}

/// Finds the `file` field and checks its content type before reading the body.
async fn read_pdf_field(
    state: &AppState,
    user: &User,
    multipart: &mut Multipart,
) -> ApiResult<(PdfUpload, Scope)> {
    loop {
        let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
        else {
            return Err(ApiError::Unprocessable("file: Field required".to_string()));
        };
        if field.name() != Some("file") {
            debug!(name = ?field.name(), "Skipping unrelated multipart field");
            continue;
        }

        if field.content_type() != Some(mime::APPLICATION_PDF.essence_str()) {
            return Err(ApiError::bad_request("Only PDF files are allowed"));
        }
        let scope = check_access(state, user).await?.clone();

        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        info!(%filename, "Upload received");
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        return Ok((
            PdfUpload {
                filename,
                bytes: bytes.to_vec(),
            },
            scope,
        ));
    }
}

#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
async fn upload_pdf(
    State(state): State<AppState>,
    user: User,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart =
        multipart.map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;
    let (PdfUpload { filename, bytes }, scope) = read_pdf_field(&state, &user, &mut multipart).await?;

    let sha256 = ingest::checksum(&bytes);
    debug!(%sha256, size = bytes.len(), "Checksum computed");

    let settings = &state.config.ingest;
    let pages = ingest::extract_pages(bytes, settings.page_timeout())
        .await
        .map_err(|err| {
            warn!(error = %err, %filename, "Rejecting unreadable PDF");
            ApiError::bad_request("Invalid PDF file")
        })?;

    let summary = ingest::index_pages(
        &pages,
        Upload {
            scope: &scope,
            user_id: &user.user_id,
            filename: &filename,
        },
        settings,
        state.embedder.as_ref(),
        state.index.as_ref(),
    )
    .await?;

    let doc_id = db::insert_document(
        &state.db_pool,
        &db::NewDocument {
            scope: &scope,
            user_id: &user.user_id,
            filename: &filename,
            sha256: &sha256,
            pages: summary.pages,
        },
    )
    .await?;
    db::insert_audit(
        &state.db_pool,
        Some(&doc_id),
        &user.user_id,
        &scope,
        "ingest",
        &json!({ "chunks": summary.chunks }),
    )
    .await?;

    Ok(Json(json!({
        "status": "ok",
        "doc_id": doc_id,
        "chunks": summary.chunks,
    })))
}

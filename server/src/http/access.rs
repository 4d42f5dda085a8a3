//! Project membership management along the Owner → Admin → Manager → Member hierarchy.
//!
//! Every holder of a role manages exactly the role below it, and only inside the
//! project their token is scoped to.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::{delete, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    app::{AppState, Role, Scope, User, db},
    http::{ApiError, ApiResult},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/add-member", post(add_member))
        .route("/remove-member", delete(remove_member))
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberParams {
    user_id: String,
    company_id: String,
    team_id: String,
    project_id: String,
    role: Option<String>,
}

impl MemberParams {
    fn scope(&self) -> Scope {
        Scope {
            company_id: self.company_id.clone(),
            team_id: self.team_id.clone(),
            project_id: self.project_id.clone(),
        }
    }
}

fn query_params(params: Result<Query<MemberParams>, QueryRejection>) -> ApiResult<MemberParams> {
    params
        .map(|Query(inner)| inner)
        .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))
}

fn ensure_same_scope(current: &User, target: &Scope) -> ApiResult<()> {
    if current.scope.as_ref() == Some(target) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You can only manage members in your own project.",
        ))
    }
}

fn allowed_roles() -> String {
    let quoted: Vec<String> = Role::ALL.iter().map(|role| format!("'{role}'")).collect();
    format!("[{}]", quoted.join(", "))
}

const fn add_denied(manager: Role) -> &'static str {
    match manager {
        Role::Owner => "Owner can only add admins. Admins can then add managers.",
        Role::Admin => "Admin can only add managers. Managers can then add members.",
        Role::Manager => "Manager can only add members.",
        Role::Member => "Only owner, admins, or managers can add members.",
    }
}

const fn remove_denied(manager: Role) -> &'static str {
    match manager {
        Role::Owner => "Owner can only remove admins.",
        Role::Admin => "Admin can only remove managers.",
        Role::Manager => "Manager can only remove members.",
        Role::Member => "Only owner, admins, or managers can remove members.",
    }
}

#[tracing::instrument(skip_all)]
async fn add_member(
    State(AppState { db_pool, .. }): State<AppState>,
    current: User,
    params: Result<Query<MemberParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let params = query_params(params)?;
    let scope = params.scope();
    ensure_same_scope(&current, &scope)?;

    let requested = params.role.as_deref().unwrap_or("member");
    let role: Role = requested.parse().map_err(|_| {
        ApiError::bad_request(format!("Invalid role. Allowed: {}", allowed_roles()))
    })?;

    let manager = current.highest_role().unwrap_or(Role::Member);
    if manager.subordinate() != Some(role) {
        return Err(ApiError::forbidden(add_denied(manager)));
    }

    const DUPLICATE: &str = "This user is already a member of this project.";
    if db::find_membership_role(&db_pool, &params.user_id, &scope)
        .await?
        .is_some()
    {
        return Err(ApiError::bad_request(DUPLICATE));
    }
    match db::insert_membership(&db_pool, &params.user_id, &scope, role).await {
        Ok(()) => {}
        Err(ref err) if db::is_unique_violation(err) => {
            return Err(ApiError::bad_request(DUPLICATE));
        }
        Err(err) => return Err(err.into()),
    }

    info!(
        by = %current.user_id,
        user_id = %params.user_id,
        %role,
        project_id = %scope.project_id,
        "Member added"
    );
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Member added as {role}"),
    })))
}

#[tracing::instrument(skip_all)]
async fn remove_member(
    State(AppState { db_pool, .. }): State<AppState>,
    current: User,
    params: Result<Query<MemberParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let params = query_params(params)?;
    let scope = params.scope();
    ensure_same_scope(&current, &scope)?;

    let manager = current.highest_role().unwrap_or(Role::Member);
    if manager == Role::Member {
        return Err(ApiError::forbidden(remove_denied(manager)));
    }

    let target = db::find_membership_role(&db_pool, &params.user_id, &scope)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("Membership not found for this user in this project.".to_string())
        })?;
    if target == Role::Owner {
        return Err(ApiError::forbidden(
            "Owner cannot be removed. Owner is permanent.",
        ));
    }
    if manager.subordinate() != Some(target) {
        return Err(ApiError::forbidden(remove_denied(manager)));
    }

    db::delete_membership(&db_pool, &params.user_id, &scope).await?;
    info!(
        by = %current.user_id,
        user_id = %params.user_id,
        role = %target,
        project_id = %scope.project_id,
        "Member removed"
    );
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Removed {} from project {}.", params.user_id, scope.project_id),
    })))
}

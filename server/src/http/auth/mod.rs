//! Bearer token authentication.
//!
//! - `token`: HS256 JWT issue / verify.
//! - `password`: argon2 hashing for stored credentials.
//!
//! Handlers take a [`User`] argument; extraction fails with 403 when no bearer
//! token is sent and with 401 when the token is unusable.

pub mod password;
pub mod token;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

pub use token::{Claims, JwtKeys, TokenError};

use crate::{
    app::{AppState, Role, Scope, User},
    http::error::ApiError,
};

/// Builds the caller from verified claims.
///
/// Owner tokens need no project scope; every other token must name
/// `team_id`, `project_id` and `company_id`. Unknown role names are ignored.
///
/// # Errors
///
/// Returns [`ApiError::MissingClaim`] naming the first absent field.
pub fn user_from_claims(claims: Claims) -> Result<User, ApiError> {
    let Claims {
        user_id,
        company_id,
        team_id,
        project_id,
        roles,
        ..
    } = claims;
    let user_id = user_id.ok_or(ApiError::MissingClaim("user_id"))?;
    let roles: Vec<Role> = roles
        .iter()
        .filter_map(|raw| {
            raw.parse()
                .inspect_err(|_| debug!(role = %raw, "Ignoring unknown role in token"))
                .ok()
        })
        .collect();

    if roles.contains(&Role::Owner) {
        let scope = match (company_id, team_id, project_id) {
            (Some(company_id), Some(team_id), Some(project_id)) => Some(Scope {
                company_id,
                team_id,
                project_id,
            }),
            _ => None,
        };
        return Ok(User {
            user_id,
            scope,
            roles: vec![Role::Owner],
        });
    }

    let team_id = team_id.ok_or(ApiError::MissingClaim("team_id"))?;
    let project_id = project_id.ok_or(ApiError::MissingClaim("project_id"))?;
    let company_id = company_id.ok_or(ApiError::MissingClaim("company_id"))?;
    Ok(User {
        user_id,
        scope: Some(Scope {
            company_id,
            team_id,
            project_id,
        }),
        roles,
    })
}

impl FromRequestParts<AppState> for User {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::NotAuthenticated)?;
        let claims = state.jwt.decode(bearer.token()).map_err(|err| {
            debug!(error = %err, "Rejected bearer token");
            ApiError::InvalidToken
        })?;
        user_from_claims(claims)
    }
}

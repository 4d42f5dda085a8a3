//! HTTP API of the vault.
//!
//! Defines the routes, the bearer token extractor and the error responses.

pub mod access;
pub mod auth;
pub mod chat;
pub mod error;
pub mod login;
pub mod search;
pub mod server;
pub mod upload;

pub(crate) use error::{ApiError, ApiResult};

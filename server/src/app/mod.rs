mod commands;
pub(crate) mod db;
pub mod model;
pub(crate) mod retrieval;
mod startup;
mod state;
#[cfg(test)]
pub(crate) mod test_support;

// Re-export a curated crate-visible surface for consumers of `crate::app`
pub(crate) use commands::{ensure_index, grant_owner, migrate};
pub(crate) use startup::start;
pub(crate) use state::AppState;

pub use model::{Role, Scope, User};

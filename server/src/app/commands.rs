//! One-shot operator commands run from the CLI.

use std::path::Path;

use eyre::{WrapErr as _, bail};
use tracing::info;

use crate::{
    app::{
        db,
        model::{Role, Scope},
        state::{initialize_database, pinecone_client},
    },
    cli::GrantOwnerArgs,
    clients::{EnsureOutcome, VectorIndex as _},
    config::load,
};

/// Opens the configured database, applying any pending migrations.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or a migration fails.
pub(crate) async fn migrate(config_path: &Path) -> eyre::Result<()> {
    let config = load(config_path).await?;
    let pool = initialize_database(&config, config_path).await?;
    pool.close().await;
    info!("Database schema is up to date");
    Ok(())
}

/// Creates the vector index unless it already exists.
///
/// # Errors
///
/// Returns an error if Pinecone is not configured or the control plane rejects the request.
pub(crate) async fn ensure_index(config_path: &Path) -> eyre::Result<()> {
    let config = load(config_path).await?;
    let client = pinecone_client(&config)?;
    let name = config.pinecone.index.as_deref().unwrap_or_default();
    match client
        .ensure_index()
        .await
        .wrap_err("Failed to ensure vector index")?
    {
        EnsureOutcome::Created => info!(
            index = name,
            dimension = config.pinecone.dimension,
            "Index created successfully"
        ),
        EnsureOutcome::AlreadyExists => info!(index = name, "Index already exists"),
    }
    Ok(())
}

/// Makes an existing user the single owner of a project.
///
/// # Errors
///
/// Returns an error if the user does not exist, already belongs to the project, or
/// the project already has an owner.
pub(crate) async fn grant_owner(args: &GrantOwnerArgs) -> eyre::Result<()> {
    let config_path = args.common.config.as_path();
    let config = load(config_path).await?;
    let pool = initialize_database(&config, config_path).await?;
    let scope = Scope {
        company_id: args.company_id.clone(),
        team_id: args.team_id.clone(),
        project_id: args.project_id.clone(),
    };

    let outcome = grant_owner_in(&pool, &args.user_id, &scope).await;
    pool.close().await;
    outcome?;

    info!(
        user_id = %args.user_id,
        project_id = %scope.project_id,
        "Owner granted"
    );
    Ok(())
}

async fn grant_owner_in(pool: &db::DbPool, user_id: &str, scope: &Scope) -> eyre::Result<()> {
    if !db::user_id_exists(pool, user_id).await? {
        bail!("User {user_id} does not exist; sign up first");
    }
    if db::project_has_owner(pool, scope).await? {
        bail!("There can only be one owner per project. An owner already exists.");
    }
    if db::find_membership_role(pool, user_id, scope).await?.is_some() {
        bail!("This user is already a member of this project.");
    }
    match db::insert_membership(pool, user_id, scope, Role::Owner).await {
        Ok(()) => Ok(()),
        Err(ref err) if db::is_unique_violation(err) => {
            bail!("There can only be one owner per project. An owner already exists.")
        }
        Err(err) => Err(err.into()),
    }
}

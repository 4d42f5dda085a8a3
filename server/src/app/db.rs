//! `SQLite` persistence: users, project memberships, ingested documents and the audit trail.

use core::str::FromStr as _;
use core::time::Duration;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use sqlx::{
    FromRow,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use uuid::Uuid;

use crate::app::model::{Role, Scope};

pub(crate) type DbPool = SqlitePool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Opens (creating if necessary) the database at `path` and runs pending migrations.
///
/// `:memory:` opens a private in-memory database backed by a single connection.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a migration fails.
pub(crate) async fn init(path: &Path) -> eyre::Result<DbPool> {
    let in_memory = path == Path::new(":memory:");
    let (options, pool_options) = if in_memory {
        (
            SqliteConnectOptions::from_str("sqlite::memory:")?,
            // every connection would see its own empty database otherwise
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        )
    } else {
        (
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5)),
            SqlitePoolOptions::new().max_connections(8),
        )
    };

    let pool = pool_options.connect_with(options).await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// Whether `err` is a violated UNIQUE / PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, &sqlx::Error::Database(ref db_err) if db_err.is_unique_violation())
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
}

pub(crate) async fn user_exists(pool: &DbPool, email: &str, user_id: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE email = ? OR user_id = ? LIMIT 1")
        .bind(email)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map(|row| row.is_some())
}

pub(crate) async fn user_id_exists(pool: &DbPool, user_id: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE user_id = ? LIMIT 1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map(|row| row.is_some())
}

pub(crate) async fn insert_user(
    pool: &DbPool,
    user_id: &str,
    email: &str,
    password_hash: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO users (id, user_id, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(email)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_user_by_email(pool: &DbPool, email: &str) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>("SELECT user_id, email, password_hash FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Role of `user_id` in `scope`, if they are a member.
///
/// A role string that no longer parses is reported as a decode error.
pub(crate) async fn find_membership_role(
    pool: &DbPool,
    user_id: &str,
    scope: &Scope,
) -> sqlx::Result<Option<Role>> {
    let role = sqlx::query_scalar::<_, String>(
        "SELECT role FROM memberships
         WHERE user_id = ? AND company_id = ? AND team_id = ? AND project_id = ?",
    )
    .bind(user_id)
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .fetch_optional(pool)
    .await?;

    role.map(|raw| raw.parse::<Role>().map_err(|err| sqlx::Error::Decode(Box::new(err))))
        .transpose()
}

pub(crate) async fn project_has_owner(pool: &DbPool, scope: &Scope) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM memberships
         WHERE company_id = ? AND team_id = ? AND project_id = ? AND role = 'owner' LIMIT 1",
    )
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .fetch_optional(pool)
    .await
    .map(|row| row.is_some())
}

pub(crate) async fn insert_membership(
    pool: &DbPool,
    user_id: &str,
    scope: &Scope,
    role: Role,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO memberships (user_id, company_id, team_id, project_id, role, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .bind(role.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the number of deleted rows (0 or 1).
pub(crate) async fn delete_membership(
    pool: &DbPool,
    user_id: &str,
    scope: &Scope,
) -> sqlx::Result<u64> {
    sqlx::query(
        "DELETE FROM memberships
         WHERE user_id = ? AND company_id = ? AND team_id = ? AND project_id = ?",
    )
    .bind(user_id)
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .execute(pool)
    .await
    .map(|res| res.rows_affected())
}

/// A document whose chunks were written to the vector index.
#[derive(Debug, Clone)]
pub(crate) struct NewDocument<'data> {
    pub scope: &'data Scope,
    pub user_id: &'data str,
    pub filename: &'data str,
    pub sha256: &'data str,
    pub pages: u32,
}

/// Stores the document record and returns its generated id.
pub(crate) async fn insert_document(pool: &DbPool, doc: &NewDocument<'_>) -> sqlx::Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO documents
         (id, company_id, team_id, project_id, user_id, filename, sha256, pages, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&doc.scope.company_id)
    .bind(&doc.scope.team_id)
    .bind(&doc.scope.project_id)
    .bind(doc.user_id)
    .bind(doc.filename)
    .bind(doc.sha256)
    .bind(doc.pages)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}

#[cfg(test)]
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AuditRow {
    pub document_id: Option<String>,
    pub user_id: String,
    pub company_id: String,
    pub team_id: String,
    pub project_id: String,
    pub action: String,
    pub meta: String,
    pub created_at: chrono::DateTime<Utc>,
}

pub(crate) async fn insert_audit(
    pool: &DbPool,
    document_id: Option<&str>,
    user_id: &str,
    scope: &Scope,
    action: &str,
    meta: &Value,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO uploads
         (document_id, user_id, company_id, team_id, project_id, action, meta, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document_id)
    .bind(user_id)
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .bind(action)
    .bind(meta.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Audit entries of a project, oldest first.
#[cfg(test)]
pub(crate) async fn audit_for_scope(pool: &DbPool, scope: &Scope) -> sqlx::Result<Vec<AuditRow>> {
    sqlx::query_as::<_, AuditRow>(
        "SELECT document_id, user_id, company_id, team_id, project_id, action, meta, created_at
         FROM uploads WHERE company_id = ? AND team_id = ? AND project_id = ? ORDER BY id",
    )
    .bind(&scope.company_id)
    .bind(&scope.team_id)
    .bind(&scope.project_id)
    .fetch_all(pool)
    .await
}

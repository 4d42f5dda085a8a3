//! Argon2id password hashing. Hashing is CPU bound and runs on the blocking pool.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng},
};
use secrecy::{ExposeSecret as _, SecretString};
use tokio::task;

/// Returns the PHC string for `password`.
///
/// # Errors
///
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash(password: SecretString) -> eyre::Result<String> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| eyre::eyre!("password hashing failed: {err}"))
    })
    .await?
}

/// Whether `password` matches the stored PHC string. Unparsable hashes never match.
///
/// # Errors
///
/// Returns an error only if the blocking task panics.
pub async fn verify(password: SecretString, stored: String) -> eyre::Result<bool> {
    let matches = task::spawn_blocking(move || {
        PasswordHash::new(&stored).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.expose_secret().as_bytes(), &parsed)
                .is_ok()
        })
    })
    .await?;
    Ok(matches)
}

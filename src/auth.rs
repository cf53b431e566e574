//! Password hashing (Argon2id, PHC string format).
//!
//! Hashing and verification are deliberately slow; both run on the
//! persistence worker thread, never on the tick loop.

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hashes a raw password into a self-describing PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verifies a raw password against a stored PHC string. An empty or
/// unparseable stored hash (guest accounts) never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Startup self-check of the KDF. The process must refuse to serve logins
/// if this fails.
pub fn self_check() -> anyhow::Result<()> {
    let hash = hash_password("probe")?;
    if !verify_password("probe", &hash) {
        return Err(anyhow!("KDF self-check round trip failed"));
    }
    Ok(())
}

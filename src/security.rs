//! Password hashing and default-admin provisioning.
//! Credentials are stored as Argon2 PHC strings and verified with the
//! constant-time verifier; plaintext never reaches the store.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{SaltString, PasswordHash};

use crate::store::Store;

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Create the `admin` user with the admin role on first run. A no-op when the
/// user already exists.
pub async fn ensure_default_admin(store: &Store, password: &str) -> Result<()> {
    if store.user_by_username("admin").await?.is_some() {
        return Ok(());
    }
    let phc = hash_password(password)?;
    let id = store.create_user("admin", "Administrator", &phc).await?;
    store.assign_role(id, "admin").await?;
    tracing::info!("provisioned default admin user");
    Ok(())
}

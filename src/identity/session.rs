use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, AppResult};
use crate::store::Store;
use crate::tprintln;

/// Token plus the expiry the store recorded for it. `None` expiry means a
/// non-expiring "remember me" session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expiration: Option<DateTime<Utc>>,
}

fn gen_token() -> AppResult<String> {
    // 128-bit random token, lowercase hex. The token is the sole bearer
    // credential, so an RNG failure must never degrade to a fixed value.
    let mut buf = [0u8; 16];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::internal("rng_failure".to_string(), e.to_string()))?;
    let mut out = String::with_capacity(32);
    use std::fmt::Write as _;
    for b in &buf {
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}

/// Issues and resolves opaque session tokens against the store. Sessions are
/// never mutated or revoked; lifetime is governed purely by the expiry
/// comparison at lookup time.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self { Self { ttl: Duration::hours(24) } }
}

impl SessionManager {
    pub async fn create_session(
        &self,
        store: &Store,
        username: &str,
        remember_me: bool,
    ) -> AppResult<IssuedSession> {
        let Some(user_id) = store.user_id_by_username(username).await? else {
            return Err(AppError::not_found("unknown_user", "no user with that username exists"));
        };
        let expiration = if remember_me { None } else { Some(Utc::now() + self.ttl) };
        let token = gen_token()?;
        store.insert_session(user_id, &token, expiration).await?;
        tprintln!("session.create user_id={} remember_me={}", user_id, remember_me);
        Ok(IssuedSession { token, expiration })
    }

    /// Exact token match filtered to live sessions. Expired and unknown
    /// tokens both come back as `None`.
    pub async fn resolve_session(&self, store: &Store, token: &str) -> AppResult<Option<i64>> {
        Ok(store.resolve_session(token, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_hex_and_unpredictable() {
        let a = gen_token().expect("token");
        let b = gen_token().expect("token");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_ne!(a, "0".repeat(32), "token generation must fail loudly, not zero-fill");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::AppResult;
use crate::store::Store;

use super::principal::Profile;
use super::session::SessionManager;

// The same generic messages for every failure of their kind: a wrong password
// and an unknown username must be indistinguishable on the wire.
const LOGIN_FAILED_MESSAGE: &str = "no user with matching login data was found";
const SESSION_FAILED_MESSAGE: &str = "no matching session was found";

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub remember_me: bool,
}

/// Distinguishes an absent `expiration` field (failure results) from an
/// explicit null (a non-expiring session): a present field, even null,
/// deserializes to `Some(inner)`.
fn nullable_expiration<'de, D>(de: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(de).map(Some)
}

/// Outcome of either login path. On failure only `success` and the fixed
/// `error_message` are populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable_expiration"
    )]
    pub expiration: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LoginResult {
    pub fn success(profile: Profile, token: String, expiration: Option<DateTime<Utc>>) -> Self {
        Self {
            success: true,
            profile: Some(profile),
            token: Some(token),
            expiration: Some(expiration),
            error_message: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            profile: None,
            token: None,
            expiration: None,
            error_message: Some(LOGIN_FAILED_MESSAGE.to_string()),
        }
    }

    pub fn session_failure() -> Self {
        Self {
            success: false,
            profile: None,
            token: None,
            expiration: None,
            error_message: Some(SESSION_FAILED_MESSAGE.to_string()),
        }
    }
}

/// Validates credentials against the store and issues sessions on success.
#[derive(Debug, Clone, Default)]
pub struct CredentialValidator {
    pub sessions: SessionManager,
}

impl CredentialValidator {
    pub fn new(sessions: SessionManager) -> Self { Self { sessions } }

    /// Password login. Unknown usernames and wrong passwords both yield the
    /// identical generic failure result; store failures propagate as errors.
    pub async fn authenticate(&self, store: &Store, req: &LoginRequest) -> AppResult<LoginResult> {
        let Some(user) = store.user_by_username(&req.username).await? else {
            return Ok(LoginResult::failure());
        };
        if !crate::security::verify_password(&user.password_hash, &req.password) {
            return Ok(LoginResult::failure());
        }
        let Some(profile) = store.profile_by_username(&req.username).await? else {
            return Ok(LoginResult::failure());
        };
        let issued = self.sessions.create_session(store, &req.username, req.remember_me).await?;
        info!("auth.login user={}", req.username);
        Ok(LoginResult::success(profile, issued.token, issued.expiration))
    }

    /// Bearer-token login: resolve a live session and hydrate the profile.
    /// The success payload echoes the presented token and does not restate
    /// the stored expiry.
    pub async fn login_with_token(&self, store: &Store, token: &str) -> AppResult<LoginResult> {
        let Some(user_id) = self.sessions.resolve_session(store, token).await? else {
            return Ok(LoginResult::session_failure());
        };
        let Some(profile) = store.profile_by_id(user_id).await? else {
            return Ok(LoginResult::session_failure());
        };
        Ok(LoginResult::success(profile, token.to_string(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_expiration_survives_the_wire() {
        let remembered = LoginResult::success(Profile::default(), "tok".to_string(), None);
        let json = serde_json::to_value(&remembered).expect("serialize");
        assert!(json["expiration"].is_null(), "non-expiring sessions report an explicit null");

        let back: LoginResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.expiration, Some(None));
        assert_eq!(back, remembered);
    }

    #[test]
    fn failure_results_omit_expiration_entirely() {
        let failed = LoginResult::failure();
        let json = serde_json::to_value(&failed).expect("serialize");
        assert!(json.get("expiration").is_none());
        assert!(json.get("token").is_none());
        assert!(json.get("profile").is_none());

        let back: LoginResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.expiration, None);
        assert_eq!(back, failed);
    }

    #[test]
    fn dated_expiration_round_trips() {
        let at = Utc::now();
        let result = LoginResult::success(Profile::default(), "tok".to_string(), Some(at));
        let back: LoginResult =
            serde_json::from_value(serde_json::to_value(&result).expect("serialize"))
                .expect("deserialize");
        assert_eq!(back.expiration, Some(Some(at)));
    }
}

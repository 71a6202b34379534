use std::collections::BTreeSet;

use chrono::Utc;

use crate::error::AppResult;
use crate::store::Store;

/// How a required role set is evaluated against the roles a user holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleMode {
    /// At least one required role must be held (logical OR).
    #[default]
    Any,
    /// Every required role must be held (logical AND).
    All,
}

/// A required role set plus its evaluation mode. The routing layer wraps
/// protected operations with a guard; a failed check must short-circuit with
/// a fixed "forbidden" outcome before the operation runs.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    pub required: BTreeSet<String>,
    pub mode: RoleMode,
}

impl RoleGuard {
    pub fn any<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { required: required.into_iter().map(Into::into).collect(), mode: RoleMode::Any }
    }

    pub fn all<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { required: required.into_iter().map(Into::into).collect(), mode: RoleMode::All }
    }

    /// Membership evaluation. A user holding no roles never passes, even for
    /// an empty requirement.
    pub fn satisfied_by(&self, held: &BTreeSet<String>) -> bool {
        if held.is_empty() {
            return false;
        }
        match self.mode {
            RoleMode::All => self.required.iter().all(|r| held.contains(r)),
            RoleMode::Any => self.required.iter().any(|r| held.contains(r)),
        }
    }
}

/// Evaluate a guard for a bearer token. Fails closed: no token, unknown or
/// expired token, and an empty role set all come back `Ok(false)`. Store
/// failures propagate as errors so an outage is never read as a denial.
///
/// The role fetch is a single query scoped by the same liveness filter as
/// session resolution, so access can never be granted through an expired
/// session.
pub async fn check_authorization(
    store: &Store,
    token: Option<&str>,
    guard: &RoleGuard,
) -> AppResult<bool> {
    let Some(token) = token else {
        return Ok(false);
    };
    let held = store.roles_for_live_session(token, Utc::now()).await?;
    Ok(guard.satisfied_by(&held))
}

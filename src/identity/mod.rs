//! Central identity, session, and authorization handling for authgate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod authorizer;

pub use principal::{Profile, UserSummary};
pub use session::{IssuedSession, SessionManager};
pub use provider::{CredentialValidator, LoginRequest, LoginResult};
pub use authorizer::{check_authorization, RoleGuard, RoleMode};

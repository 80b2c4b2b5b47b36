//! JWT authentication with role-based access control.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless) and
//! long-lived refresh tokens (7 days, database-tracked). Access tokens are
//! presented as `Authorization: Bearer` headers and are never refreshed
//! implicitly; an expired token is rejected and the client must call the
//! refresh endpoint itself.

mod bearer;
mod errors;
mod extractors;
mod state;

pub use bearer::bearer_token;
pub use errors::{AuthError, AuthErrorKind};
pub use extractors::{AdminAuth, Auth};
pub use state::HasAuthBackend;

//! Bearer-token identity resolution
//!
//! - [`verifier`]: token → user id backends
//! - [`middleware`]: request-level resolution, exemptions and agent key check

pub mod middleware;
pub mod verifier;

pub use middleware::{
    AGENT_KEY_HEADER, AuthExemptions, AuthenticatedUser, bearer_token, identity_middleware,
    verify_agent_key,
};
pub use verifier::{IdentityError, IdentityVerifier, JwtVerifier, RemoteIdentityVerifier};

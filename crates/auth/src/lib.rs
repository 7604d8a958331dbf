//! `placetrack-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, permissions_for_roles, AuthzError, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;

//! Authentication primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - [`jwt`] -- HS256 access-token issuing and verification.
//! - [`tokens`] -- Opaque random session and refresh tokens.

pub mod jwt;
pub mod password;
pub mod tokens;

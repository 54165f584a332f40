//! Gateway-side request authentication.
//!
//! Forwards each request's credentials to the auth service's validate
//! endpoint and injects the resulting identity as `x-user-*` headers for the
//! services behind the gateway. Client-supplied identity headers are always
//! stripped first.

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;

//! Greenhouse auth service library.
//!
//! Exposes the building blocks (token issuer, session lifecycle, cache,
//! stores, HTTP surface) so integration tests and the binary entrypoint can
//! both access them.

pub mod auth;
pub mod background;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
pub mod store;

//! Domain primitives shared by the auth service, the gateway, and the
//! persistence layer.

pub mod duration;
pub mod error;
pub mod identity;
pub mod retry;
pub mod types;
pub mod validation;

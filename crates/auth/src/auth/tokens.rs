//! Opaque session and refresh tokens.
//!
//! Both are hex-encoded bytes from the thread-local CSPRNG (ChaCha seeded
//! from the OS). They carry no structure; validity is decided by the store.

use rand::RngCore;

/// Session tokens are 32 random bytes (64 hex chars).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Refresh tokens are 48 random bytes (96 hex chars).
pub const REFRESH_TOKEN_BYTES: usize = 48;

/// Generate `len` random bytes, hex-encoded.
pub fn generate_secure_token(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn generate_session_token() -> String {
    generate_secure_token(SESSION_TOKEN_BYTES)
}

pub fn generate_refresh_token() -> String {
    generate_secure_token(REFRESH_TOKEN_BYTES)
}

//! Security primitives.
//!
//! - [`password`]: password hashing and verification
//! - [`secret`]: session secrets and pairing codes

pub mod password;
pub mod secret;

//! Password hashing and verification utilities.
//!
//! New hashes are written as unsalted SHA-256 lowercase hex by default, or as
//! Argon2id PHC strings when configured. Verification accepts both forms, so
//! switching the scheme never locks existing accounts out.

use crate::config::PasswordScheme;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 digest of `password` as lowercase hex.
pub fn sha256_hex(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash a password with the given scheme.
pub fn hash_password(
    password: &str,
    scheme: PasswordScheme,
) -> Result<String, argon2::password_hash::Error> {
    match scheme {
        PasswordScheme::Sha256 => Ok(sha256_hex(password)),
        PasswordScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            Ok(Argon2::default()
                .hash_password(password.as_bytes(), &salt)?
                .to_string())
        }
    }
}

/// Verify a password against a stored hash of either scheme.
///
/// Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with("$argon2") {
        return match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        };
    }

    let candidate = sha256_hex(password);
    let stored = stored.to_ascii_lowercase();
    candidate.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn sha256_scheme_round_trip() {
        let hash = hash_password("hunter2", PasswordScheme::Sha256).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let hash = sha256_hex("secret").to_uppercase();
        assert!(verify_password("secret", &hash));
    }

    #[test]
    fn argon2_scheme_round_trip() {
        let hash = hash_password("hunter2", PasswordScheme::Argon2).unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn malformed_hashes_never_match() {
        assert!(!verify_password("", ""));
        assert!(!verify_password("x", "$argon2id$garbage"));
        assert!(!verify_password("x", "not-a-digest"));
    }
}

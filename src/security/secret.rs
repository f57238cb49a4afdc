//! Random session secrets and pairing codes.
//!
//! Both use `rand::thread_rng`, a CSPRNG reseeded from the OS.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of a session token secret.
pub const SECRET_LEN: usize = 32;

/// Number of digits in a pairing code.
pub const PAIRING_CODE_LEN: usize = 6;

/// Generate a session secret: [`SECRET_LEN`] characters drawn uniformly from `[0-9A-Za-z]`.
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Generate a zero-padded numeric pairing code.
pub fn generate_pairing_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PAIRING_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn secret_shape() {
        let s = generate_secret();
        assert_eq!(s.len(), SECRET_LEN);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn secrets_do_not_repeat() {
        let seen: HashSet<String> = (0..1000).map(|_| generate_secret()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn pairing_code_shape() {
        for _ in 0..100 {
            let code = generate_pairing_code();
            assert_eq!(code.len(), PAIRING_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}

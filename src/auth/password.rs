// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Salted password hashing (PBKDF2-HMAC-SHA256).
//!
//! Encoded form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

use super::AuthError;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Work factor. Tests use a low count to keep the suite fast.
const ITERATIONS: u32 = if cfg!(test) { 1_000 } else { 100_000 };

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let iterations = NonZeroU32::new(ITERATIONS)
        .ok_or_else(|| AuthError::Internal("zero PBKDF2 iterations".into()))?;

    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| AuthError::Internal("system randomness unavailable".into()))?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{SCHEME}${}${}${}",
        iterations,
        Base64::encode_string(&salt),
        Base64::encode_string(&hash)
    ))
}

/// Check a password against an encoded hash. Malformed hashes never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (Base64::decode_vec(salt), Base64::decode_vec(hash)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let encoded = hash_password("hunter22").unwrap();
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("hunter22", &encoded));
        assert!(!verify_password("hunter23", &encoded));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a));
        assert!(verify_password("same-password", &b));
    }

    #[test]
    fn malformed_hashes_never_match() {
        for encoded in [
            "",
            "plaintext",
            "bcrypt$10$abc$def",
            "pbkdf2-sha256$0$AAAA$AAAA",
            "pbkdf2-sha256$1000$!!!$AAAA",
            "pbkdf2-sha256$1000$AAAA$AAAA$extra",
        ] {
            assert!(!verify_password("anything", encoded), "{encoded}");
        }
    }
}
